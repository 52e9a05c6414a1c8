use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Ollama chat failed ({status}): {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to parse chat chunk: {0}")]
    Decode(String),
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

/// One NDJSON line of a streamed `/api/chat` response.
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<Message>,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        OllamaClient {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Starts a streamed chat completion and yields the assistant's content
    /// fragments in generation order. The stream terminates when the model
    /// is done generating; transport and decode problems surface as error
    /// items, never panics.
    pub async fn chat_stream(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<impl Stream<Item = Result<String, OllamaError>> + Send, OllamaError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
            options: None,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OllamaError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OllamaError::Upstream { status, body });
        }

        Ok(fragment_stream(response.bytes_stream().boxed()))
    }
}

struct FragmentState<S> {
    bytes: S,
    buf: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

/// Turns a raw NDJSON byte stream into a stream of content fragments.
///
/// Network chunks split lines (and multi-byte characters) at arbitrary
/// points, so bytes are buffered until a newline and each complete line is
/// decoded as one `ChatChunk`.
fn fragment_stream<S, E>(bytes: S) -> impl Stream<Item = Result<String, OllamaError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let state = FragmentState {
        bytes,
        buf: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::try_unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.ready.pop_front() {
                return Ok(Some((fragment, st)));
            }
            if st.finished {
                return Ok(None);
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(&chunk);
                    while let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = st.buf.drain(..=pos).collect();
                        decode_line(&line, &mut st.ready)?;
                    }
                }
                Some(Err(e)) => return Err(OllamaError::Request(e.to_string())),
                None => {
                    st.finished = true;
                    let rest = std::mem::take(&mut st.buf);
                    decode_line(&rest, &mut st.ready)?;
                }
            }
        }
    })
}

fn decode_line(line: &[u8], ready: &mut VecDeque<String>) -> Result<(), OllamaError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }

    let chunk: ChatChunk =
        serde_json::from_slice(line).map_err(|e| OllamaError::Decode(e.to_string()))?;

    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            ready.push_back(message.content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use futures::TryStreamExt;
    use std::io;

    fn chunks(parts: &[&str]) -> Vec<Result<Bytes, io::Error>> {
        parts
            .iter()
            .map(|part| Ok(Bytes::copy_from_slice(part.as_bytes())))
            .collect()
    }

    async fn collect(parts: &[&str]) -> Result<Vec<String>, OllamaError> {
        fragment_stream(stream::iter(chunks(parts)))
            .try_collect()
            .await
    }

    #[tokio::test]
    async fn yields_content_fragments_in_order() {
        let fragments = collect(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        ])
        .await
        .unwrap();

        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_network_chunks() {
        let fragments = collect(&[
            "{\"message\":{\"role\":\"assistant\",\"co",
            "ntent\":\"A\"},\"done\":false}\n{\"message\":",
            "{\"role\":\"assistant\",\"content\":\"B\"},\"done\":false}\n",
        ])
        .await
        .unwrap();

        assert_eq!(fragments, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn final_line_without_newline_is_decoded() {
        let fragments = collect(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"tail\"},\"done\":true}",
        ])
        .await
        .unwrap();

        assert_eq!(fragments, vec!["tail"]);
    }

    #[tokio::test]
    async fn empty_body_yields_no_fragments() {
        let fragments = collect(&[]).await.unwrap();
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn malformed_chunk_is_a_decode_error() {
        let outcome = collect(&["not json at all\n"]).await;
        assert!(matches!(outcome, Err(OllamaError::Decode(_))));
    }

    #[tokio::test]
    async fn transport_error_is_surfaced() {
        let parts: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(
                b"{\"message\":{\"role\":\"assistant\",\"content\":\"x\"},\"done\":false}\n",
            )),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];

        let outcome: Result<Vec<String>, OllamaError> =
            fragment_stream(stream::iter(parts)).try_collect().await;
        assert!(matches!(outcome, Err(OllamaError::Request(_))));
    }
}
