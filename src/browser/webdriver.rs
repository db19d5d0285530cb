//! W3C WebDriver page driver
//!
//! Drives chromedriver/geckodriver over the WebDriver HTTP protocol:
//! - session creation with browser capabilities
//! - element lookup by CSS selector, with optional text filtering
//! - pointer actions for hover and mouse movement
//! - script execution for bulk text reads
//!
//! Error payloads (`{"value": {"error", "message"}}`) are mapped to
//! [`DriverError`] variants.

use super::{DriverError, DriverResult, Locator, PageDriver};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// W3C web element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Duration of a synthetic pointer move
const POINTER_MOVE_MS: u64 = 250;

/// Default budget for individual protocol calls
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Script returning the text of every element matching a selector
const TEXTS_SCRIPT: &str = "return Array.from(document.querySelectorAll(arguments[0]))\
    .map(function (e) { return e.innerText || e.textContent || ''; });";

/// A live browser session behind a WebDriver endpoint
#[derive(Debug)]
pub struct WebDriverSession {
    client: Client,
    endpoint: String,
    session_id: Option<String>,
}

/// Builds the new-session payload for a browser
fn capabilities(config: &BrowserConfig) -> Value {
    let mut args: Vec<&str> = vec!["--window-size=1366,900"];
    match config.browser_name.as_str() {
        "firefox" => {
            let mut args: Vec<&str> = Vec::new();
            if config.headless {
                args.push("-headless");
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "firefox",
                        "moz:firefoxOptions": { "args": args }
                    }
                }
            })
        }
        name => {
            if config.headless {
                args.push("--headless=new");
            }
            args.push("--disable-dev-shm-usage");
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": name,
                        "goog:chromeOptions": { "args": args }
                    }
                }
            })
        }
    }
}

/// Maps a W3C error code to a driver error
fn protocol_error(error: &str, message: &str) -> DriverError {
    match error {
        "no such element" | "stale element reference" => {
            DriverError::ElementNotFound(message.to_string())
        }
        "timeout" | "script timeout" => DriverError::Timeout(message.to_string()),
        "invalid session id" => DriverError::SessionClosed,
        "invalid selector" => DriverError::InvalidSelector(message.to_string()),
        _ => DriverError::Protocol {
            error: error.to_string(),
            message: message.to_string(),
        },
    }
}

/// Extracts the `value` member of a response, or the error it carries
fn unwrap_value(body: Value) -> DriverResult<Value> {
    if let Some(error) = body.pointer("/value/error").and_then(Value::as_str) {
        let message = body
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown webdriver error");
        return Err(protocol_error(error, message));
    }
    Ok(body.get("value").cloned().unwrap_or(Value::Null))
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY).and_then(Value::as_str).map(str::to_string)
}

fn element_ref(id: &str) -> Value {
    json!({ ELEMENT_KEY: id })
}

fn pointer_move(origin: Value, x: i64, y: i64) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [{
                "type": "pointerMove",
                "duration": POINTER_MOVE_MS,
                "origin": origin,
                "x": x,
                "y": y
            }]
        }]
    })
}

impl WebDriverSession {
    /// Opens a new browser session
    ///
    /// # Arguments
    ///
    /// * `config` - Browser configuration (endpoint, browser name, headless)
    ///
    /// # Returns
    ///
    /// * `Ok(WebDriverSession)` - Session ready for navigation
    /// * `Err(DriverError)` - The endpoint refused or could not be reached
    pub async fn connect(config: &BrowserConfig) -> DriverResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let mut session = Self {
            client,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            session_id: None,
        };

        let value = session
            .send(Method::POST, "/session", Some(capabilities(config)))
            .await?;

        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                error: "session not created".to_string(),
                message: format!("session id missing in response: {}", value),
            })?;

        debug!("WebDriver session {} opened at {}", id, session.endpoint);
        session.session_id = Some(id.to_string());
        Ok(session)
    }

    fn session_path(&self, suffix: &str) -> DriverResult<String> {
        let id = self.session_id.as_deref().ok_or(DriverError::SessionClosed)?;
        Ok(format!("/session/{}{}", id, suffix))
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        match unwrap_value(body) {
            Err(e) => Err(e),
            Ok(_) if !status.is_success() => Err(DriverError::Protocol {
                error: format!("http {}", status.as_u16()),
                message: text.chars().take(240).collect(),
            }),
            Ok(value) => Ok(value),
        }
    }

    async fn session_call(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> DriverResult<Value> {
        let path = self.session_path(suffix)?;
        self.send(method, &path, body).await
    }

    /// Runs a call under a deadline, mapping expiry to [`DriverError::Timeout`]
    async fn with_timeout(
        &self,
        timeout: Duration,
        what: &str,
        call: impl std::future::Future<Output = DriverResult<Value>>,
    ) -> DriverResult<Value> {
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| DriverError::Timeout(format!("{} after {:?}", what, timeout)))?
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<String>> {
        let value = self
            .session_call(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;

        Ok(value
            .as_array()
            .map(|elements| elements.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    async fn element_text(&self, id: &str) -> DriverResult<String> {
        let value = self
            .session_call(Method::GET, &format!("/element/{}/text", id), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Element ids matching the locator, text filter applied
    async fn find(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        let ids = self.find_all(&locator.selector).await?;
        if locator.text.is_none() {
            return Ok(ids);
        }

        let mut matching = Vec::new();
        for id in ids {
            let text = self.element_text(&id).await?;
            if locator.accepts_text(&text) {
                matching.push(id);
            }
        }
        Ok(matching)
    }

    async fn first(&self, locator: &Locator) -> DriverResult<String> {
        self.find(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::ElementNotFound(locator.to_string()))
    }
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        debug!("navigate {}", url);
        let call = self.session_call(Method::POST, "/url", Some(json!({ "url": url })));
        self.with_timeout(timeout, "navigation", call).await?;
        Ok(())
    }

    async fn reload(&mut self, timeout: Duration) -> DriverResult<()> {
        let call = self.session_call(Method::POST, "/refresh", Some(json!({})));
        self.with_timeout(timeout, "reload", call).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        let value = self.session_call(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn content(&mut self) -> DriverResult<String> {
        let value = self.session_call(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn count(&mut self, locator: &Locator) -> DriverResult<usize> {
        Ok(self.find(locator).await?.len())
    }

    async fn text_contents(&mut self, locator: &Locator) -> DriverResult<Vec<String>> {
        let call = self.evaluate(TEXTS_SCRIPT, vec![json!(locator.selector)]);
        let value = call.await?;

        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .filter(|text| locator.accepts_text(text))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hover(&mut self, locator: &Locator) -> DriverResult<()> {
        let id = self.first(locator).await?;
        self.session_call(Method::POST, "/actions", Some(pointer_move(element_ref(&id), 0, 0)))
            .await?;
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        let id = self.first(locator).await?;
        debug!("click {}", locator);
        self.session_call(Method::POST, &format!("/element/{}/click", id), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn select_option(&mut self, locator: &Locator, value: &str) -> DriverResult<()> {
        let select = self.first(locator).await?;
        let option = self
            .session_call(
                Method::POST,
                &format!("/element/{}/element", select),
                Some(json!({
                    "using": "css selector",
                    "value": format!("option[value=\"{}\"]", value.replace('"', "\\\""))
                })),
            )
            .await?;

        let option_id = element_id(&option)
            .ok_or_else(|| DriverError::ElementNotFound(format!("option '{}'", value)))?;

        self.session_call(
            Method::POST,
            &format!("/element/{}/click", option_id),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        let id = self.first(locator).await?;
        self.session_call(Method::POST, &format!("/element/{}/clear", id), Some(json!({})))
            .await?;
        self.session_call(
            Method::POST,
            &format!("/element/{}/value", id),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn move_mouse(&mut self, x: i64, y: i64) -> DriverResult<()> {
        self.session_call(Method::POST, "/actions", Some(pointer_move(json!("viewport"), x, y)))
            .await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        let call = self.session_call(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        );
        self.with_timeout(COMMAND_TIMEOUT, "script", call).await
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.session_id.is_none() {
            return Ok(());
        }

        let result = self.session_call(Method::DELETE, "", None).await;
        self.session_id = None;

        if let Err(e) = &result {
            warn!("Failed to close WebDriver session: {}", e);
        }
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn connected(server: &MockServer) -> WebDriverSession {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc", "capabilities": {} }
            })))
            .mount(server)
            .await;

        let config = BrowserConfig {
            webdriver_url: server.uri(),
            ..BrowserConfig::default()
        };
        WebDriverSession::connect(&config).await.unwrap()
    }

    #[test]
    fn test_capabilities() {
        let mut config = BrowserConfig {
            headless: true,
            ..BrowserConfig::default()
        };
        let caps = capabilities(&config);
        assert_eq!(
            caps.pointer("/capabilities/alwaysMatch/browserName"),
            Some(&json!("chrome"))
        );
        let args = caps
            .pointer("/capabilities/alwaysMatch/goog:chromeOptions/args")
            .unwrap();
        assert!(args.as_array().unwrap().contains(&json!("--headless=new")));

        config.browser_name = "firefox".to_string();
        let caps = capabilities(&config);
        assert!(caps
            .pointer("/capabilities/alwaysMatch/moz:firefoxOptions")
            .is_some());
    }

    #[test]
    fn test_protocol_error_mapping() {
        assert!(matches!(
            protocol_error("no such element", "x"),
            DriverError::ElementNotFound(_)
        ));
        assert!(matches!(
            protocol_error("timeout", "x"),
            DriverError::Timeout(_)
        ));
        assert!(matches!(
            protocol_error("invalid session id", "x"),
            DriverError::SessionClosed
        ));
        assert!(matches!(
            protocol_error("unknown error", "x"),
            DriverError::Protocol { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_reads_session_id() {
        let server = MockServer::start().await;
        let session = connected(&server).await;
        assert_eq!(session.session_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_navigate_and_current_url() {
        let server = MockServer::start().await;
        let mut session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .and(body_partial_json(json!({ "url": "https://portal.example.org/" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/abc/url"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "value": "https://portal.example.org/" })),
            )
            .mount(&server)
            .await;

        session
            .navigate("https://portal.example.org/", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            session.current_url().await.unwrap(),
            "https://portal.example.org/"
        );
    }

    #[tokio::test]
    async fn test_click_with_text_filter() {
        let server = MockServer::start().await;
        let mut session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/elements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { ELEMENT_KEY: "e1" }, { ELEMENT_KEY: "e2" } ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/abc/element/e1/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "1" })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/session/abc/element/e2/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "2" })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/session/abc/element/e2/click"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let next = Locator::css("#paginacao a").with_text("2");
        assert_eq!(session.count(&next).await.unwrap(), 1);
        session.click(&next).await.unwrap();

        let missing = Locator::css("#paginacao a").with_text("3");
        assert!(matches!(
            session.click(&missing).await,
            Err(DriverError::ElementNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_error_payload_is_mapped() {
        let server = MockServer::start().await;
        let mut session = connected(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/abc/source"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "invalid session id", "message": "session deleted" }
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            session.content().await,
            Err(DriverError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_text_contents_uses_script() {
        let server = MockServer::start().await;
        let mut session = connected(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/abc/execute/sync"))
            .and(body_partial_json(json!({ "args": ["div.card"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": ["ANA\nCRM: 1", "BIA\nCRM: 2"]
            })))
            .mount(&server)
            .await;

        let texts = session
            .text_contents(&Locator::css("div.card"))
            .await
            .unwrap();
        assert_eq!(texts, vec!["ANA\nCRM: 1", "BIA\nCRM: 2"]);
    }

    #[tokio::test]
    async fn test_close_deletes_session() {
        let server = MockServer::start().await;
        let mut session = connected(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/session/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        session.close().await.unwrap();
        assert!(session.session_id.is_none());
        assert!(matches!(
            session.content().await,
            Err(DriverError::SessionClosed)
        ));
    }
}
