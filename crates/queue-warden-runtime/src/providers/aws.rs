//! AWS SQS provider implementation using the HTTP Query API.
//!
//! This module talks to SQS directly over HTTP instead of through the AWS SDK,
//! which keeps the dependency stack small and lets the request signing and
//! response parsing be unit tested without infrastructure.
//!
//! ## Protocol
//!
//! Every operation is a form-encoded `POST` to the service endpoint carrying an
//! `Action` parameter and API version `2012-11-05`. Responses are XML.
//!
//! ## Authentication
//!
//! Requests are signed with AWS Signature Version 4. Credentials come from the
//! configuration or, when unset there, from `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
//!
//! ## Message Attributes
//!
//! Outgoing attributes are sent as `String` message attributes. On receive,
//! attributes carrying a `StringValue` are kept and binary ones are ignored.

use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityTimeout,
};
use crate::provider::{AwsSqsConfig, ProviderType};
use crate::transport::QueueTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const SERVICE: &str = "sqs";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const LIST_PAGE_SIZE: &str = "1000";

/// Group used for FIFO sends that do not name one
const DEFAULT_MESSAGE_GROUP_ID: &str = "queue-warden";

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("SQS service error: {code} - {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AwsError {
    /// Check if error is transient and the call could succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Authentication(_) => false,
            Self::AccessDenied(_) => false,
            Self::NetworkError(_) => true,
            Self::Timeout(_) => true,
            Self::ServiceError { .. } => true,
            Self::QueueNotFound(_) => false,
            Self::InvalidReceipt(_) => false,
            Self::MessageTooLarge { .. } => false,
            Self::ConfigurationError(_) => false,
            Self::SerializationError(_) => false,
        }
    }

    /// Map AWS error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(msg) => QueueError::AuthenticationFailed { message: msg },
            Self::AccessDenied(msg) => QueueError::PermissionDenied { operation: msg },
            Self::NetworkError(msg) => QueueError::ConnectionFailed { message: msg },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue) => QueueError::QueueNotFound { queue_name: queue },
            Self::InvalidReceipt(receipt) => QueueError::ReceiptInvalid { receipt },
            Self::MessageTooLarge { size, max_size } => {
                QueueError::MessageTooLarge { size, max_size }
            }
            Self::ConfigurationError(msg) => {
                QueueError::Configuration(ConfigurationError::Invalid { message: msg })
            }
            Self::SerializationError(msg) => {
                QueueError::Serialization(SerializationError::MalformedResponse { message: msg })
            }
        }
    }
}

impl From<AwsError> for QueueError {
    fn from(error: AwsError) -> Self {
        error.to_queue_error()
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Static credentials used to sign requests
#[derive(Clone)]
pub(crate) struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    /// Resolve credentials from configuration, falling back to the environment
    fn resolve(config: &AwsSqsConfig) -> Option<Self> {
        let from_env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let access_key_id = config
            .access_key_id
            .clone()
            .or_else(|| from_env("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = config
            .secret_access_key
            .clone()
            .or_else(|| from_env("AWS_SECRET_ACCESS_KEY"))?;
        let session_token = config
            .session_token
            .clone()
            .or_else(|| from_env("AWS_SESSION_TOKEN"));

        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    credentials: AwsCredentials,
    region: String,
}

impl AwsV4Signer {
    fn new(credentials: AwsCredentials, region: String) -> Self {
        Self {
            credentials,
            region,
        }
    }

    /// Sign a form-encoded POST request
    ///
    /// Returns the headers to add to the request: `Authorization`,
    /// `x-amz-date`, `content-type` and, for temporary credentials,
    /// `x-amz-security-token`.
    fn sign_request(
        &self,
        host: &str,
        path: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers must be sorted by name
        let mut canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-amz-date:{}\n",
            FORM_CONTENT_TYPE, host, amz_date
        );
        let mut signed_headers = "content-type;host;x-amz-date".to_string();
        if let Some(token) = &self.credentials.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
            signed_headers.push_str(";x-amz-security-token");
        }

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        // Query API requests carry their parameters in the body, so the
        // canonical query string is empty.
        let canonical_request = format!(
            "POST\n{}\n\n{}\n{}\n{}",
            path, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, SERVICE
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.credentials.access_key_id, credential_scope, signed_headers, signature
        );

        let mut headers = vec![
            ("Authorization".to_string(), authorization_header),
            ("x-amz-date".to_string(), amz_date),
            ("content-type".to_string(), FORM_CONTENT_TYPE.to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        headers
    }

    /// Calculate the signature using the derived signing key
    ///
    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Encode parameters as an `application/x-www-form-urlencoded` body
fn encode_form(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// AWS SQS Provider
// ============================================================================

/// AWS SQS transport
///
/// The provider is thread-safe and can be shared across async tasks using `Arc`.
pub struct AwsSqsProvider {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    config: AwsSqsConfig,
    endpoint: url::Url,
}

impl AwsSqsProvider {
    /// Create new AWS SQS provider
    ///
    /// # Errors
    ///
    /// Returns error if the region is empty, the endpoint override is not a
    /// valid URL, or the HTTP client cannot be built.
    pub fn new(config: AwsSqsConfig) -> Result<Self, AwsError> {
        let credentials = AwsCredentials::resolve(&config);
        Self::with_credentials(config, credentials)
    }

    pub(crate) fn with_credentials(
        config: AwsSqsConfig,
        credentials: Option<AwsCredentials>,
    ) -> Result<Self, AwsError> {
        if config.region.trim().is_empty() {
            return Err(AwsError::ConfigurationError(
                "Region cannot be empty".to_string(),
            ));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.region));
        let endpoint = url::Url::parse(&endpoint).map_err(|e| {
            AwsError::ConfigurationError(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(AwsError::ConfigurationError(format!(
                "Endpoint '{}' has no host",
                endpoint
            )));
        }

        let signer = credentials.map(|c| AwsV4Signer::new(c, config.region.clone()));

        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
        })
    }

    /// Host header value for the endpoint, including a non-default port
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Send a signed Query API request and return the response body
    #[instrument(skip(self, params), fields(endpoint = %self.endpoint))]
    async fn call(
        &self,
        action: &str,
        mut params: BTreeMap<String, String>,
    ) -> Result<String, AwsError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| AwsError::Authentication("No credentials configured".to_string()))?;

        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        let body = encode_form(&params);

        let path = self.endpoint.path().to_string();
        let headers = signer.sign_request(&self.host(), &path, &body, &Utc::now());

        let mut request = self.http_client.post(self.endpoint.clone()).body(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AwsError::Timeout(self.config.request_timeout())
            } else if e.is_connect() {
                AwsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AwsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        debug!(action, status = status.as_u16(), "SQS request succeeded");
        Ok(response_body)
    }
}

impl fmt::Debug for AwsSqsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint.as_str())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

fn queue_params(queue_url: &QueueUrl) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("QueueUrl".to_string(), queue_url.as_str().to_string());
    params
}

#[async_trait]
impl QueueTransport for AwsSqsProvider {
    async fn resolve_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        let mut params = BTreeMap::new();
        params.insert("QueueName".to_string(), queue.as_str().to_string());

        let response = self.call("GetQueueUrl", params).await.map_err(|e| match e {
            AwsError::QueueNotFound(_) => AwsError::QueueNotFound(queue.to_string()),
            other => other,
        })?;

        let url = first_element_text(&response, "QueueUrl")?
            .ok_or_else(|| AwsError::SerializationError("QueueUrl not found in response".to_string()))?;
        Ok(QueueUrl::new(url)?)
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::AwsSqs.max_message_size();
        let size = message.body.len()
            + message
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>();
        if size > max_size {
            return Err(AwsError::MessageTooLarge { size, max_size }.into());
        }

        let response = self
            .call("SendMessage", send_message_params(queue_url, message))
            .await?;

        let id = first_element_text(&response, "MessageId")?.ok_or_else(|| {
            AwsError::SerializationError("MessageId not found in response".to_string())
        })?;
        Ok(MessageId::from_str(&id)?)
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut params = queue_params(queue_url);
        params.insert(
            "MaxNumberOfMessages".to_string(),
            request.max_messages.to_string(),
        );
        if let Some(timeout) = request.visibility_timeout {
            params.insert("VisibilityTimeout".to_string(), timeout.as_secs().to_string());
        }
        if let Some(wait) = request.wait_time {
            params.insert("WaitTimeSeconds".to_string(), wait.as_secs().to_string());
        }
        params.insert("AttributeName.1".to_string(), "All".to_string());
        params.insert("MessageAttributeName.1".to_string(), "All".to_string());

        let response = self.call("ReceiveMessage", params).await?;
        Ok(parse_receive_message_response(&response)?)
    }

    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
        timeout: VisibilityTimeout,
    ) -> Result<(), QueueError> {
        let mut params = queue_params(queue_url);
        params.insert("ReceiptHandle".to_string(), receipt.as_str().to_string());
        params.insert("VisibilityTimeout".to_string(), timeout.as_secs().to_string());

        self.call("ChangeMessageVisibility", params)
            .await
            .map_err(|e| with_receipt(e, receipt))?;
        Ok(())
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut params = queue_params(queue_url);
        params.insert("ReceiptHandle".to_string(), receipt.as_str().to_string());

        self.call("DeleteMessage", params)
            .await
            .map_err(|e| with_receipt(e, receipt))?;
        Ok(())
    }

    async fn list_queue_urls(&self) -> Result<Vec<QueueUrl>, QueueError> {
        let mut urls = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut params = BTreeMap::new();
            params.insert("MaxResults".to_string(), LIST_PAGE_SIZE.to_string());
            if let Some(token) = next_token.take() {
                params.insert("NextToken".to_string(), token);
            }

            let response = self.call("ListQueues", params).await?;
            let page = parse_list_queues_response(&response)?;
            for url in page.urls {
                urls.push(QueueUrl::new(url)?);
            }

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(urls)
    }

    async fn approximate_message_count(&self, queue_url: &QueueUrl) -> Result<u64, QueueError> {
        let mut params = queue_params(queue_url);
        params.insert(
            "AttributeName.1".to_string(),
            "ApproximateNumberOfMessages".to_string(),
        );

        let response = self.call("GetQueueAttributes", params).await?;
        let attributes = parse_attribute_pairs(&response)?;
        let count = attributes
            .get("ApproximateNumberOfMessages")
            .ok_or_else(|| {
                AwsError::SerializationError(
                    "ApproximateNumberOfMessages not found in response".to_string(),
                )
            })?;

        count.parse::<u64>().map_err(|e| {
            QueueError::Serialization(SerializationError::InvalidAttribute {
                key: format!("ApproximateNumberOfMessages ({})", e),
            })
        })
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}

/// Replace the service's receipt error text with an abbreviated handle
fn with_receipt(error: AwsError, receipt: &ReceiptHandle) -> AwsError {
    match error {
        AwsError::InvalidReceipt(_) => AwsError::InvalidReceipt(receipt.abbreviated()),
        other => other,
    }
}

/// Build SendMessage parameters, carrying attributes as `String` message attributes
///
/// FIFO queues reject sends without a group, so those always get one. Without
/// an explicit token the deduplication id is the SHA-256 of the body, which is
/// what content-based deduplication would compute.
fn send_message_params(queue_url: &QueueUrl, message: &OutgoingMessage) -> BTreeMap<String, String> {
    let mut params = queue_params(queue_url);
    params.insert("MessageBody".to_string(), message.body.clone());

    if queue_url.queue_name().map(|name| name.is_fifo()).unwrap_or(false) {
        let group = message
            .message_group_id
            .clone()
            .unwrap_or_else(|| DEFAULT_MESSAGE_GROUP_ID.to_string());
        let deduplication = message
            .deduplication_id
            .clone()
            .unwrap_or_else(|| hex::encode(Sha256::digest(message.body.as_bytes())));
        params.insert("MessageGroupId".to_string(), group);
        params.insert("MessageDeduplicationId".to_string(), deduplication);
    }

    let mut attributes: Vec<(&String, &String)> = message.attributes.iter().collect();
    attributes.sort();
    for (index, (name, value)) in attributes.into_iter().enumerate() {
        let prefix = format!("MessageAttribute.{}", index + 1);
        params.insert(format!("{}.Name", prefix), name.clone());
        params.insert(format!("{}.Value.DataType", prefix), "String".to_string());
        params.insert(format!("{}.Value.StringValue", prefix), value.clone());
    }

    params
}

// ============================================================================
// Response Parsing
// ============================================================================

fn xml_error(e: impl fmt::Display) -> AwsError {
    AwsError::SerializationError(format!("XML parsing error: {}", e))
}

/// Text of the first element with the given name, if present
fn first_element_text(xml: &str, element: &str) -> Result<Option<String>, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut inside = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) if e.name().as_ref() == element.as_bytes() => inside = true,
            Event::Text(e) if inside => {
                return e.unescape().map(|s| Some(s.into_owned())).map_err(xml_error);
            }
            Event::End(ref e) if e.name().as_ref() == element.as_bytes() => {
                return Ok(Some(String::new()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

/// Parse an error response into a typed error
fn parse_error_response(xml: &str, status_code: u16) -> AwsError {
    let code = first_element_text(xml, "Code")
        .ok()
        .flatten()
        .unwrap_or_else(|| "Unknown".to_string());
    let message = first_element_text(xml, "Message")
        .ok()
        .flatten()
        .unwrap_or_else(|| format!("HTTP status {}", status_code));

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            AwsError::QueueNotFound(message)
        }
        "InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch"
        | "ExpiredToken" | "MissingAuthenticationToken" => {
            AwsError::Authentication(format!("{}: {}", code, message))
        }
        "AccessDenied" | "AccessDeniedException" => AwsError::AccessDenied(message),
        "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" | "MessageNotInflight" => {
            AwsError::InvalidReceipt(message)
        }
        _ if status_code == 401 => AwsError::Authentication(format!("{}: {}", code, message)),
        _ if status_code == 403 => AwsError::AccessDenied(format!("{}: {}", code, message)),
        _ => AwsError::ServiceError { code, message },
    }
}

/// One page of a ListQueues response
#[derive(Debug, Default)]
struct ListQueuesPage {
    urls: Vec<String>,
    next_token: Option<String>,
}

fn parse_list_queues_response(xml: &str) -> Result<ListQueuesPage, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut page = ListQueuesPage::default();
    let mut current: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => current = Some(e.name().as_ref().to_vec()),
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match current.as_deref() {
                    Some(b"QueueUrl") => page.urls.push(text),
                    Some(b"NextToken") => page.next_token = Some(text),
                    _ => {}
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(page)
}

/// Collect `<Attribute><Name/><Value/></Attribute>` pairs
fn parse_attribute_pairs(xml: &str) -> Result<HashMap<String, String>, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut attributes = HashMap::new();
    let mut current: Option<Vec<u8>> = None;
    let mut name: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => current = Some(e.name().as_ref().to_vec()),
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match current.as_deref() {
                    Some(b"Name") => name = Some(text),
                    Some(b"Value") => {
                        if let Some(key) = name.take() {
                            attributes.insert(key, text);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(attributes)
}

/// Fields of a `<Message>` element collected while parsing
#[derive(Default)]
struct MessageFields {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: String,
    system_attributes: HashMap<String, String>,
    attributes: HashMap<String, String>,
    pending_name: Option<String>,
}

impl MessageFields {
    fn build(self) -> Result<ReceivedMessage, AwsError> {
        let message_id = self
            .message_id
            .ok_or_else(|| AwsError::SerializationError("Message without MessageId".to_string()))?;
        let receipt = self.receipt_handle.ok_or_else(|| {
            AwsError::SerializationError("Message without ReceiptHandle".to_string())
        })?;

        let receive_count = self
            .system_attributes
            .get("ApproximateReceiveCount")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let message_group_id = self.system_attributes.get("MessageGroupId").cloned();

        Ok(ReceivedMessage {
            message_id: MessageId::from_str(&message_id)
                .map_err(|e| AwsError::SerializationError(e.to_string()))?,
            receipt_handle: ReceiptHandle::new(receipt)
                .map_err(|e| AwsError::SerializationError(e.to_string()))?,
            body: self.body,
            attributes: self.attributes,
            receive_count,
            message_group_id,
        })
    }
}

/// Parse a ReceiveMessage response
///
/// Text is not trimmed so message bodies keep their leading and trailing whitespace.
fn parse_receive_message_response(xml: &str) -> Result<Vec<ReceivedMessage>, AwsError> {
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<MessageFields> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"Message" {
                    current = Some(MessageFields::default());
                }
                path.push(name);
            }
            Event::Text(e) => {
                if let Some(fields) = current.as_mut() {
                    let text = e.unescape().map_err(xml_error)?.into_owned();
                    apply_message_text(fields, &path, text);
                }
            }
            Event::CData(e) => {
                if let Some(fields) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    apply_message_text(fields, &path, text);
                }
            }
            Event::End(ref e) => {
                path.pop();
                if e.name().as_ref() == b"Message" {
                    if let Some(fields) = current.take() {
                        messages.push(fields.build()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

fn apply_message_text(fields: &mut MessageFields, path: &[Vec<u8>], text: String) {
    let leaf = path.last().map(Vec::as_slice);
    let parent = path.len().checked_sub(2).map(|i| path[i].as_slice());

    match (parent, leaf) {
        (Some(b"Message"), Some(b"MessageId")) => fields.message_id = Some(text),
        (Some(b"Message"), Some(b"ReceiptHandle")) => fields.receipt_handle = Some(text),
        (Some(b"Message"), Some(b"Body")) => fields.body.push_str(&text),
        (Some(b"Attribute"), Some(b"Name")) | (Some(b"MessageAttribute"), Some(b"Name")) => {
            fields.pending_name = Some(text)
        }
        (Some(b"Attribute"), Some(b"Value")) => {
            if let Some(name) = fields.pending_name.take() {
                fields.system_attributes.insert(name, text);
            }
        }
        (Some(b"Value"), Some(b"StringValue")) => {
            if let Some(name) = fields.pending_name.take() {
                fields.attributes.insert(name, text);
            }
        }
        _ => {}
    }
}
