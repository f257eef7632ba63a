//! Ollama generation adapter.
//!
//! Implements [`autot_core::Generator`] over `POST /api/generate`. In
//! verbose mode the response is streamed (newline-delimited JSON) and
//! echoed to stdout as it arrives; otherwise a single JSON reply is read.
//!
//! Requests that fail before any output is received are retried with the
//! same backoff as the embedding providers. A stream that breaks midway is
//! not retried, since part of it has already been shown.
//!
//! `timeout_secs` bounds a whole non-streaming request. A streamed request
//! has no overall limit; it fails only when no bytes arrive for
//! `timeout_secs`, so long generations that keep producing output finish.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;

use autot_core::Generator;

use crate::config::GenerationConfig;
use crate::embedding::post_json_with_retry;

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    num_ctx: u32,
    max_retries: u32,
    verbose: bool,
    /// Whole-request limit for single replies.
    client: reqwest::Client,
    /// Idle limit between reads for streamed replies.
    stream_client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            num_ctx: config.num_ctx,
            max_retries: config.max_retries,
            verbose: config.verbose,
            client,
            stream_client,
        })
    }

    /// Enable or disable streaming to stdout.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.url)
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": self.verbose,
            "options": {
                "temperature": self.temperature,
                "num_ctx": self.num_ctx,
            },
        })
    }

    async fn generate_once(&self, body: &serde_json::Value) -> Result<String> {
        let json = post_json_with_retry(
            &self.client,
            &self.endpoint(),
            None,
            body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
            bail!("Ollama error: {}", err);
        }
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }

    async fn generate_streaming(&self, body: &serde_json::Value) -> Result<String> {
        let url = self.endpoint();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut response = match self.stream_client.post(&url).json(body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                let err = anyhow::anyhow!("Ollama API error {}: {}", status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }

            let mut decoder = StreamDecoder::default();
            let mut stdout = std::io::stdout();
            while let Some(bytes) = response.chunk().await? {
                for piece in decoder.feed(&bytes)? {
                    write!(stdout, "{}", piece)?;
                }
                stdout.flush()?;
            }
            for piece in decoder.finish()? {
                write!(stdout, "{}", piece)?;
            }
            writeln!(stdout)?;
            return Ok(decoder.into_text());
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama generation failed after retries")))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> autot_core::Result<String> {
        let body = self.request_body(prompt);
        let result = if self.verbose {
            self.generate_streaming(&body).await
        } else {
            self.generate_once(&body).await
        };

        match result {
            Ok(text) if text.trim().is_empty() => Err(autot_core::Error::Generation(
                "model returned an empty response".to_string(),
            )),
            Ok(text) => Ok(text),
            Err(e) => Err(autot_core::Error::Generation(format!("{:#}", e))),
        }
    }
}

/// Reassembles newline-delimited JSON objects split across network chunks.
#[derive(Debug, Default)]
struct StreamDecoder {
    pending: Vec<u8>,
    text: String,
}

impl StreamDecoder {
    /// Consume bytes, returning the `response` pieces of every complete line.
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(bytes);
        let mut pieces = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(piece) = self.decode_line(&line)? {
                pieces.push(piece);
            }
        }
        Ok(pieces)
    }

    /// Decode a trailing line that arrived without a newline.
    fn finish(&mut self) -> Result<Vec<String>> {
        let line = std::mem::take(&mut self.pending);
        Ok(self.decode_line(&line)?.into_iter().collect())
    }

    fn decode_line(&mut self, line: &[u8]) -> Result<Option<String>> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let json: serde_json::Value = serde_json::from_str(line)?;
        if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
            bail!("Ollama error: {}", err);
        }
        let piece = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();
        self.text.push_str(&piece);
        Ok(Some(piece))
    }

    fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn local_config(addr: std::net::SocketAddr, timeout_secs: u64) -> GenerationConfig {
        GenerationConfig {
            url: format!("http://{}", addr),
            timeout_secs,
            max_retries: 0,
            ..GenerationConfig::default()
        }
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                return;
            }
        }
    }

    /// Answers one request with chunked NDJSON lines, pausing before each.
    async fn serve_slow_stream(listener: TcpListener, lines: Vec<&'static str>, gap: Duration) {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();
        for line in lines {
            tokio::time::sleep(gap).await;
            let chunk = format!("{}\n", line);
            socket
                .write_all(format!("{:x}\r\n{}\r\n", chunk.len(), chunk).as_bytes())
                .await
                .unwrap();
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_outlives_timeout_while_output_flows() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_slow_stream(
            listener,
            vec![
                r#"{"response":"(defun ","done":false}"#,
                r#"{"response":"f ()","done":false}"#,
                r#"{"response":")","done":true}"#,
            ],
            Duration::from_millis(600),
        ));

        // Three pauses of 0.6s add up to more than the 1s limit.
        let generator = OllamaGenerator::new(&local_config(addr, 1))
            .unwrap()
            .with_verbose(true);
        let text = generator.generate("(defun f ())").await.unwrap();
        assert_eq!(text, "(defun f ())");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_slow_stream(
            listener,
            vec![r#"{"response":"(","done":false}"#, r#"{"response":")","done":true}"#],
            Duration::from_secs(3),
        ));

        let generator = OllamaGenerator::new(&local_config(addr, 1))
            .unwrap()
            .with_verbose(true);
        let started = std::time::Instant::now();
        let err = generator.generate("(f)").await.unwrap_err();
        assert_eq!(err.kind(), "GenerationError");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_stream_decoder_joins_split_lines() {
        let mut decoder = StreamDecoder::default();
        let a = decoder.feed(b"{\"response\":\"(def\",\"done\":false}\n{\"resp").unwrap();
        assert_eq!(a, vec!["(def"]);
        let b = decoder
            .feed(b"onse\":\"un f)\",\"done\":false}\n{\"response\":\"\",\"done\":true}")
            .unwrap();
        assert_eq!(b, vec!["un f)"]);
        let c = decoder.finish().unwrap();
        assert_eq!(c, vec![""]);
        assert_eq!(decoder.into_text(), "(defun f)");
    }

    #[test]
    fn test_stream_decoder_surfaces_errors() {
        let mut decoder = StreamDecoder::default();
        assert!(decoder.feed(b"{\"error\":\"model not found\"}\n").is_err());
    }

    #[test]
    fn test_request_body() {
        let config = GenerationConfig::default();
        let generator = OllamaGenerator::new(&config).unwrap().with_verbose(true);
        let body = generator.request_body("hi");
        assert_eq!(body["model"], "deepseek-r1:70b");
        assert_eq!(generator.model_name(), "deepseek-r1:70b");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_ctx"], 4096);
        assert_eq!(generator.endpoint(), "http://localhost:11434/api/generate");
    }
}
