use super::interceptor::{classify_status, parse_retry_after};
use super::{ApiRequest, ApiResponse, FormPart, MultipartForm, RequestBody, Transport};
use super::request_log::{RequestLog, RequestRecord};
use crate::config::ClientConfig;
use crate::error::{AdminError, ApiError};
use crate::session::Session;
use log::{debug, warn};
use serde_json::Value;
use time::OffsetDateTime;

const ACCEPT: &str = "application/json";

/// reqwest-backed transport carrying the session's bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    session: Session,
    log: RequestLog,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, session: Session) -> Result<Self, AdminError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(ACCEPT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(HttpTransport {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
            log: RequestLog::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.log
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn record(&self, request: &ApiRequest, url: &str, status_code: u16, success: bool) {
        self.log.record(RequestRecord {
            method: request.method,
            url: url.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            status_code,
            success,
        });
    }
}

fn build_form(form: &MultipartForm) -> Result<reqwest::multipart::Form, ApiError> {
    let mut multipart = reqwest::multipart::Form::new();
    for (name, part) in form.parts() {
        multipart = match part {
            FormPart::Text(value) => multipart.text(name.clone(), value.clone()),
            FormPart::File {
                file_name,
                mime,
                bytes,
            } => {
                let mut file_part =
                    reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file_part = file_part.mime_str(mime)?;
                }
                multipart.part(name.clone(), file_part)
            }
        };
    }
    Ok(multipart)
}

impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(&request.path);
        let query: Vec<(&str, &str)> = request.query.iter().collect();

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .query(&query);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(form) => builder.multipart(build_form(form)?),
        };

        debug!("{} {}", request.method, url);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                self.record(&request, &url, 0, false);
                warn!("{} {} failed: {}", request.method, url, e);
                return Err(ApiError::from(e));
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        self.record(&request, &url, status.as_u16(), status.is_success());

        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(body) => body,
                Err(_) if !status.is_success() => {
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                Err(e) => {
                    return Err(ApiError::Transport(format!("Invalid JSON response: {}", e)));
                }
            }
        };

        if !status.is_success() {
            let error = classify_status(status.as_u16(), &body, retry_after);
            if matches!(error, ApiError::Unauthorized { .. }) {
                warn!("Unauthorized response from {}, dropping session", url);
                self.session.logout();
            }
            return Err(error);
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{AssumeYes, BindingOptions, Payload};
    use crate::transport::{Method, QueryParams};
    use crate::{AdminClient, AdminResource, ControllerConfig};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn reply(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            concat!(
                "HTTP/1.1 {}\r\n",
                "Content-Type: application/json\r\n",
                "Content-Length: {}\r\n",
                "Connection: close\r\n",
                "{}\r\n{}"
            ),
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    /// Reads one request and returns its head (request line and headers).
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut received = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::from_utf8_lossy(&received).into_owned();
            }
            received.extend_from_slice(&chunk[..n]);
            let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&received[..end]).into_owned();
            let body_len = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while received.len() < end + 4 + body_len {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
            return head;
        }
    }

    /// Serves `replies` in order, one connection each. Returns the base URL and
    /// the heads of the requests received so far.
    async fn serve(replies: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let heads = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::clone(&heads);
        tokio::spawn(async move {
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let head = read_request(&mut socket).await;
                received.lock().unwrap().push(head);
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}/api", addr), heads)
    }

    fn client_for(base_url: &str, session: Session) -> AdminClient {
        AdminClient::new(
            &ClientConfig::with_base_url(base_url),
            ControllerConfig::default(),
            session,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_bearer_token_and_validation_message() {
        let body = json!({
            "message": "The given data was invalid.",
            "errors": { "zname": ["Z first"], "aname": ["A second"] }
        });
        let (base_url, heads) =
            serve(vec![reply("422 Unprocessable Entity", "", &body.to_string())]).await;
        let client = client_for(&base_url, Session::with_token("tok"));
        let controller = client.controller(AdminResource::Products);

        let saved = controller.create(Payload::Json(json!({ "zname": "" }))).await;

        assert_eq!(saved, None);
        assert_eq!(controller.state().error.as_deref(), Some("Z first"));
        let head = heads.lock().unwrap()[0].clone();
        assert!(head.starts_with("POST /api/products HTTP/1.1"));
        assert!(head.to_lowercase().contains("authorization: bearer tok"));
        assert!(client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_unauthorized_response_drops_session() {
        let body = json!({ "message": "Unauthenticated." }).to_string();
        let (base_url, _) = serve(vec![reply("401 Unauthorized", "", &body)]).await;
        let client = client_for(&base_url, Session::with_token("expired"));
        let controller = client.controller(AdminResource::News);

        assert!(controller.fetch_page(QueryParams::new()).await);

        assert_eq!(controller.state().error.as_deref(), Some("Error 401: Unauthenticated."));
        assert!(!client.session().is_authenticated());
        let records = client.transport().request_log().records();
        assert_eq!(records[0].status_code, 401);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn test_empty_delete_response_counts_as_success() {
        let (base_url, heads) = serve(vec![reply("204 No Content", "", "")]).await;
        let client = client_for(&base_url, Session::with_token("tok"));
        let controller = client.controller(AdminResource::Banners);

        assert!(controller.delete_item(8, &AssumeYes).await);
        controller.unbind();

        assert_eq!(controller.state().success.as_deref(), Some("Item deleted successfully"));
        assert!(heads.lock().unwrap()[0].starts_with("DELETE /api/banners/8 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_retry_after_header_is_read() {
        let limited = reply("429 Too Many Requests", "Retry-After: 7\r\n", "{}");
        let (base_url, _) = serve(vec![limited]).await;
        let config = ClientConfig::with_base_url(base_url);
        let transport = HttpTransport::new(&config, Session::anonymous()).unwrap();

        let result = transport.send(ApiRequest::new(Method::Get, "/products")).await;

        match result {
            Err(ApiError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bound_endpoint_sends_base_params_and_transforms() {
        let body = json!({ "success": true, "data": [{ "title": "spring" }] }).to_string();
        let (base_url, heads) = serve(vec![reply("200 OK", "", &body)]).await;
        let client = client_for(&base_url, Session::anonymous());
        let options = BindingOptions::default()
            .with_base_params(QueryParams::new().with("per_page", 10))
            .with_transform(|mut item| {
                item["featured"] = json!(true);
                item
            });
        let controller = client.bind("/csr", options);

        assert!(controller.fetch_page(QueryParams::new()).await);

        assert_eq!(
            controller.state().items,
            vec![json!({ "title": "spring", "featured": true })]
        );
        let head = heads.lock().unwrap()[0].clone();
        assert!(head.starts_with("GET /api/csr?per_page=10 HTTP/1.1"));
        assert!(!head.to_lowercase().contains("authorization:"));
    }

    #[test]
    fn test_url_joining() {
        let config = ClientConfig::with_base_url("https://api.example.com/api/");
        let transport = HttpTransport::new(&config, Session::anonymous()).unwrap();

        assert_eq!(transport.url_for("/products"), "https://api.example.com/api/products");
        assert_eq!(transport.url_for("banners/4"), "https://api.example.com/api/banners/4");
    }

    #[test]
    fn test_form_with_invalid_mime_is_rejected() {
        let form =
            MultipartForm::new().file("image", "a.png", Some("not a mime".to_string()), vec![0]);
        assert!(build_form(&form).is_err());

        let form = MultipartForm::new()
            .text("title", "Chair")
            .file("image", "a.png", Some("image/png".to_string()), vec![0]);
        assert!(build_form(&form).is_ok());
    }
}
