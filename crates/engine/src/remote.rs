//! Remote-operation strategy: one OpenAPI operation behind a capability.
//!
//! Requests are derived from the operation: parameters are placed by their
//! declared location, fixed operation headers are merged in, and the body is
//! encoded per the declared content type. Server and credentials are resolved
//! by the caller immediately before each call and passed in as an
//! [`Endpoint`].

use std::sync::Arc;

use dstk_api::{
    HttpRequest, HttpResponse, HttpTransport, Method, MultipartValue, RequestBody, StatusCode, TransportError, validate_base_url,
};
use dstk_types::ValueSource;
use dstk_util::{
    OpenApiOperation, ParameterLocation, RequestContent, SecurityScheme, build_path, extract_error_message, join_url,
    parse_response_json_strict, redact_sensitive, value_to_text,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::ExecutionError;
use crate::execution::apply_post_process;
use crate::module::LocalFunction;
use crate::ui::kept_file;

/// Per-service settings shared by every operation of an OpenAPI bridge.
#[derive(Debug, Clone, Default)]
pub struct OpenApiBackend {
    pub service: String,
    /// First `servers[].url` of the document.
    pub default_server: Option<String>,
    pub security: IndexMap<String, SecurityScheme>,
    pub server: Option<ValueSource>,
    /// Security scheme name to credential source.
    pub authorization: IndexMap<String, ValueSource>,
    pub error_message_path: Option<String>,
}

/// Server and credentials in effect for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    /// Refreshed server URL; the backend default applies when `None`.
    pub server: Option<String>,
    pub credentials: IndexMap<String, String>,
}

#[derive(Debug)]
pub struct RemoteOperation {
    pub capability: String,
    pub operation: OpenApiOperation,
    pub post_process: Option<LocalFunction>,
    pub backend: Arc<OpenApiBackend>,
}

impl RemoteOperation {
    pub fn parameter_names(&self) -> Vec<String> {
        self.operation.parameter_names()
    }

    /// Build the request for one call. Parameters without a value (or `null`) are omitted.
    ///
    /// # Errors
    /// Fails without a usable server or method, or when a file kept by a
    /// `keepAsFile` input cannot be read for a multipart body.
    pub async fn build_request(
        &self,
        endpoint: &Endpoint,
        parameters: &IndexMap<String, Value>,
        body: Option<&Value>,
    ) -> Result<HttpRequest, ExecutionError> {
        let server = endpoint
            .server
            .as_deref()
            .or(self.backend.default_server.as_deref())
            .ok_or_else(|| ExecutionError::Configuration(format!("no server configured for service '{}'", self.backend.service)))?;
        validate_base_url(server).map_err(|error| ExecutionError::Configuration(error.to_string()))?;

        let method = Method::from_bytes(self.operation.method.to_ascii_uppercase().as_bytes())
            .map_err(|error| ExecutionError::Configuration(format!("invalid method '{}': {error}", self.operation.method)))?;

        let mut path_values = Map::new();
        let mut query = Vec::new();
        let mut headers = Vec::new();
        let mut cookies = Vec::new();
        for parameter in &self.operation.parameters {
            let Some(value) = parameters.get(&parameter.name).filter(|value| !value.is_null()) else {
                continue;
            };
            match parameter.location {
                ParameterLocation::Path => {
                    path_values.insert(parameter.name.clone(), value.clone());
                }
                ParameterLocation::Query => query.push((parameter.name.clone(), value_to_text(value))),
                ParameterLocation::Header => headers.push((parameter.name.clone(), value_to_text(value))),
                ParameterLocation::Cookie => cookies.push(format!("{}={}", parameter.name, value_to_text(value))),
            }
        }

        let url = join_url(server, &build_path(&self.operation.path, &path_values));
        let mut request = HttpRequest::new(method, url);
        request.query = query;
        for (name, value) in headers {
            request.set_header(name, value);
        }
        for (name, value) in &self.operation.headers {
            request.set_header(name.as_str(), value.as_str());
        }
        self.apply_credentials(&mut request, &endpoint.credentials, &mut cookies);
        if !cookies.is_empty() {
            request.set_header("Cookie", cookies.join("; "));
        }
        request.body = self.encode_body(&mut request, body).await?;
        Ok(request)
    }

    fn apply_credentials(&self, request: &mut HttpRequest, credentials: &IndexMap<String, String>, cookies: &mut Vec<String>) {
        for (scheme_name, credential) in credentials {
            match self.backend.security.get(scheme_name) {
                Some(SecurityScheme::ApiKey { name, location }) => match location {
                    ParameterLocation::Query => request.query.push((name.clone(), credential.clone())),
                    ParameterLocation::Cookie => cookies.push(format!("{name}={credential}")),
                    ParameterLocation::Header | ParameterLocation::Path => request.set_header(name.as_str(), credential.as_str()),
                },
                Some(SecurityScheme::Bearer) => request.set_header("Authorization", format!("Bearer {credential}")),
                Some(SecurityScheme::Basic) => request.set_header("Authorization", format!("Basic {credential}")),
                Some(SecurityScheme::Other(_)) | None => request.set_header("Authorization", credential.as_str()),
            }
        }
    }

    async fn encode_body(&self, request: &mut HttpRequest, body: Option<&Value>) -> Result<RequestBody, ExecutionError> {
        let Some(content) = &self.operation.request_content else {
            return Ok(RequestBody::Empty);
        };
        let body = match content {
            RequestContent::Json => {
                request.set_header("content-type", "application/json");
                match body {
                    None | Some(Value::Null) => RequestBody::Empty,
                    Some(Value::String(raw)) => RequestBody::Text(raw.clone()),
                    Some(value) => RequestBody::Json(value.clone()),
                }
            }
            RequestContent::Multipart => {
                let mut parts = Vec::new();
                if let Some(Value::Object(fields)) = body {
                    for (name, value) in fields {
                        parts.push((name.clone(), multipart_value(value).await?));
                    }
                }
                RequestBody::Multipart(parts)
            }
            RequestContent::Other(content_type) => {
                error!(
                    service = %self.backend.service,
                    capability = %self.capability,
                    content_type = %content_type,
                    "Unsupported request body content type"
                );
                RequestBody::Empty
            }
        };
        Ok(body)
    }

    /// Send the request and turn the response into a result.
    pub async fn execute(
        &self,
        transport: &dyn HttpTransport,
        endpoint: &Endpoint,
        parameters: &IndexMap<String, Value>,
        body: Option<&Value>,
    ) -> Result<Value, ExecutionError> {
        let request = self.build_request(endpoint, parameters, body).await?;
        debug!(
            service = %self.backend.service,
            capability = %self.capability,
            request = %redact_sensitive(&request_line(&request)),
            "calling remote operation"
        );
        let response = transport.send(request).await.map_err(redact_transport_error)?;
        let value = self.interpret(response)?;
        apply_post_process(self.post_process.as_ref(), value).await
    }

    fn interpret(&self, response: HttpResponse) -> Result<Value, ExecutionError> {
        if !response.is_success() {
            let reason = StatusCode::from_u16(response.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("Error");
            let raw = format!("Error: {reason} ({})", response.status);
            let text = response.text();
            let message = match self
                .backend
                .error_message_path
                .as_deref()
                .and_then(|path| extract_error_message(&text, path))
            {
                Some(extracted) => format!("{extracted} {raw}"),
                None => raw,
            };
            return Err(ExecutionError::Http {
                status: response.status,
                message,
            });
        }

        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        let text = response.text();
        if response.is_json() {
            return parse_response_json_strict(&text, Some(response.status)).map_err(|error| ExecutionError::Decode(error.to_string()));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// `METHOD url?query` plus the authorization header, for log lines. Not redacted.
fn request_line(request: &HttpRequest) -> String {
    let mut line = format!("{} {}", request.method, request.url);
    if !request.query.is_empty() {
        let query: Vec<String> = request.query.iter().map(|(name, value)| format!("{name}={value}")).collect();
        line.push('?');
        line.push_str(&query.join("&"));
    }
    if let Some(authorization) = request.header("Authorization") {
        line.push_str(" authorization: ");
        line.push_str(authorization);
    }
    line
}

/// Client errors may quote the full URL, credentials in the query included.
fn redact_transport_error(error: TransportError) -> ExecutionError {
    let error = match error {
        TransportError::InvalidRequest(message) => TransportError::InvalidRequest(redact_sensitive(&message)),
        TransportError::Network(message) => TransportError::Network(redact_sensitive(&message)),
    };
    ExecutionError::Transport(error)
}

/// Part for one body field. Files kept by a `keepAsFile` input are uploaded
/// with their contents and name.
async fn multipart_value(value: &Value) -> Result<MultipartValue, ExecutionError> {
    if let Some((name, path)) = kept_file(value) {
        let data = tokio::fs::read(path)
            .await
            .map_err(|error| ExecutionError::Input(format!("File could not be read: {}: {error}", path.display())))?;
        return Ok(MultipartValue::Bytes {
            file_name: Some(name.to_string()),
            data,
        });
    }
    let part = match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(|item| item.as_u64().is_some_and(|byte| byte <= 255)) => {
            MultipartValue::Bytes {
                file_name: None,
                data: items.iter().filter_map(Value::as_u64).map(|byte| byte as u8).collect(),
            }
        }
        other => MultipartValue::Text(value_to_text(other)),
    };
    Ok(part)
}
