//! Anthropic Messages API client.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{parse_analysis, prompt::DETECTION_PROMPT, Analysis, VisionClassifier};
use crate::config::{ApiKey, ClassifierSettings};
use crate::frame::Frame;

const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: [ContentBlock<'a>; 2],
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClassifier {
    settings: ClassifierSettings,
    api_key: ApiKey,
    agent: ureq::Agent,
}

impl AnthropicClassifier {
    pub fn new(settings: ClassifierSettings, api_key: ApiKey) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self {
            settings,
            api_key,
            agent,
        }
    }

    /// Send one frame with the detection prompt and return the model's text.
    fn request(&self, frame: &Frame) -> Result<String> {
        let image = frame.to_base64();
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            messages: [Message {
                role: "user",
                content: [
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: media_type(frame.bytes()),
                            data: &image,
                        },
                    },
                    ContentBlock::Text {
                        text: DETECTION_PROMPT,
                    },
                ],
            }],
        };
        let body = serde_json::to_string(&body).context("encode vision request")?;

        let response = self
            .agent
            .post(&self.settings.api_url)
            .set("x-api-key", self.api_key.expose())
            .set("anthropic-version", API_VERSION)
            .set("content-type", "application/json")
            .send_string(&body);
        let raw = match response {
            Ok(resp) => resp.into_string().context("read vision response")?,
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                return Err(anyhow!(
                    "vision API returned HTTP {}: {}",
                    code,
                    detail.trim()
                ));
            }
            Err(err) => return Err(err).context("vision API request failed"),
        };

        let parsed: MessagesResponse =
            serde_json::from_str(&raw).context("decode vision response")?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| anyhow!("vision response has no text content"))
    }
}

impl VisionClassifier for AnthropicClassifier {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn classify(&mut self, frame: &Frame) -> Analysis {
        let started = Instant::now();
        match self.request(frame) {
            Ok(text) => {
                let analysis = parse_analysis(&text);
                log::info!(
                    "vision analysis ({} ms, model {}): {} detection(s), summary: {}",
                    started.elapsed().as_millis(),
                    self.settings.model,
                    analysis.detections.len(),
                    analysis.summary
                );
                analysis
            }
            Err(err) => {
                log::error!("vision analysis failed: {:#}", err);
                Analysis::failed(&err)
            }
        }
    }
}

fn media_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Accept one request, hand its head and body back, reply with `body`.
    fn serve_once(status: &'static str, body: String) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                head.push_str(&line);
            }
            let mut request_body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut request_body);
            let _ = tx.send((head, String::from_utf8_lossy(&request_body).to_string()));

            let mut stream = reader.into_inner();
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(reply.as_bytes());
        });
        (format!("http://{}/v1/messages", addr), rx)
    }

    fn classifier(api_url: String) -> AnthropicClassifier {
        AnthropicClassifier::new(
            ClassifierSettings {
                api_url,
                timeout: Duration::from_secs(5),
                ..ClassifierSettings::default()
            },
            ApiKey::new("sk-test"),
        )
    }

    #[test]
    fn sends_image_and_prompt_and_parses_reply() {
        let text = r#"Sure. {"detections":[{"type":"person","location":"in_front","description":"Courier at the gate","confidence":0.81}],"summary":"Courier"}"#;
        let reply = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
        })
        .to_string();
        let (url, requests) = serve_once("200 OK", reply);

        let mut vision = classifier(url);
        let analysis = vision.classify(&Frame::new(b"\xff\xd8hello\xff\xd9".to_vec()));
        assert_eq!(analysis.summary, "Courier");
        assert_eq!(analysis.detections.len(), 1);

        let (head, body) = requests.recv_timeout(Duration::from_secs(5)).expect("request");
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /v1/messages"));
        assert!(head.contains("x-api-key: sk-test"));
        assert!(head.contains("anthropic-version: 2023-06-01"));

        let body: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(body["model"], "claude-3-5-haiku-20241022");
        assert_eq!(body["max_tokens"], 500);
        let content = &body["messages"][0]["content"];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[0]["source"]["data"], "/9hoZWxsb//Z");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], DETECTION_PROMPT);
    }

    #[test]
    fn api_error_degrades_to_error_summary() {
        let (url, _requests) = serve_once(
            "401 Unauthorized",
            r#"{"type":"error","error":{"type":"authentication_error"}}"#.to_string(),
        );
        let analysis = classifier(url).classify(&Frame::new(vec![0xff, 0xd8]));
        assert!(analysis.detections.is_empty());
        assert!(analysis.summary.starts_with("Error: "));
        assert!(analysis.summary.contains("401"));
    }

    #[test]
    fn unreachable_api_degrades_to_error_summary() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let analysis =
            classifier(format!("http://{}/v1/messages", addr)).classify(&Frame::new(vec![1, 2, 3]));
        assert!(analysis.detections.is_empty());
        assert!(analysis.summary.starts_with("Error: "));
    }

    #[test]
    fn png_frames_are_labelled() {
        assert_eq!(media_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(media_type(b"\xff\xd8\xff"), "image/jpeg");
    }
}
