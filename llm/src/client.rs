use futures::stream::Stream;
use futures::{
    StreamExt,
    stream::{self},
};
use reqwest::header::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt::Debug, pin::Pin};
use tracing::{Level, event, instrument};

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
}

pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

impl Client {
    pub fn with_headers(headers: HeaderMap) -> anyhow::Result<Self> {
        Ok(Client {
            client: reqwest::Client::builder().default_headers(headers).build()?,
        })
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn get<U, T>(&self, url: U) -> anyhow::Result<T>
    where
        U: reqwest::IntoUrl + std::fmt::Debug,
        T: DeserializeOwned,
    {
        let response = self.client.get(url).send().await?;
        let text = Self::success_text(response).await?;
        event!(Level::TRACE, response = text);

        Ok(serde_json::from_str::<T>(&text)?)
    }

    #[instrument(level = "trace", skip(self, request))]
    pub async fn post<U, S, T>(&self, url: U, request: &S) -> anyhow::Result<T>
    where
        U: reqwest::IntoUrl + std::fmt::Debug,
        S: Serialize + Sized,
        T: DeserializeOwned,
    {
        let response = self.client.post(url).json(request).send().await?;
        let text = Self::success_text(response).await?;
        event!(Level::TRACE, response = text);

        Ok(serde_json::from_str::<T>(&text)?)
    }

    /// POST and decode a line-delimited response as it arrives.
    ///
    /// `process` maps a raw line to its JSON payload (e.g. strips `data: `),
    /// or returns `None` to skip the line. A transport failure mid-stream is
    /// yielded as an `Err` and ends the stream.
    #[instrument(level = "trace", skip(self, request, process))]
    pub async fn post_stream<U, S, F, T>(
        &self,
        url: U,
        request: &S,
        process: F,
    ) -> anyhow::Result<BoxedStream<anyhow::Result<T>>>
    where
        U: reqwest::IntoUrl + Debug,
        S: Serialize + Sized,
        T: DeserializeOwned + Send + 'static,
        F: Fn(&str) -> Option<&str> + 'static + Send,
    {
        let response = self.client.post(url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            anyhow::bail!("Request failed with status {}: {}", status, error_body);
        }

        let buffered_stream = response.bytes_stream().scan(
            (String::new(), false),
            move |(buffer, failed), chunk| {
                if *failed {
                    return futures::future::ready(None);
                }
                let messages: Vec<anyhow::Result<T>> = match chunk {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        drain_lines(buffer, &process).into_iter().map(Ok).collect()
                    }
                    Err(e) => {
                        tracing::warn!("Error reading chunk: {}", e);
                        *failed = true;
                        vec![Err(anyhow::anyhow!("Stream interrupted: {}", e))]
                    }
                };
                futures::future::ready(Some(messages))
            },
        );

        Ok(Box::pin(buffered_stream.flat_map(stream::iter)))
    }

    async fn success_text(response: reqwest::Response) -> anyhow::Result<String> {
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            anyhow::bail!("Request failed with status {}: {}", status, error_body);
        }
        Ok(response.text().await?)
    }
}

/// Decode every complete line in `buffer`, leaving a trailing partial line in place.
/// Lines that fail to parse are logged and skipped.
pub(crate) fn drain_lines<T, F>(buffer: &mut String, process: &F) -> Vec<T>
where
    T: DeserializeOwned,
    F: Fn(&str) -> Option<&str>,
{
    let mut messages = vec![];
    let mut last_newline_pos = 0;

    for (idx, _) in buffer.match_indices('\n') {
        let line = buffer[last_newline_pos..idx].trim_end_matches('\r');
        last_newline_pos = idx + 1;

        if let Some(processed) = process(line) {
            if processed.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(processed) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!("Failed to parse line: {}: {}", processed, e),
            }
        }
    }

    buffer.drain(..last_newline_pos);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestEvent {
        id: u32,
        text: String,
    }

    fn sse(line: &str) -> Option<&str> {
        line.strip_prefix("data: ")
    }

    fn feed(chunks: &[&[u8]]) -> Vec<TestEvent> {
        let mut buffer = String::new();
        let mut events = vec![];
        for chunk in chunks {
            buffer.push_str(&String::from_utf8_lossy(chunk));
            events.extend(drain_lines::<TestEvent, _>(&mut buffer, &sse));
        }
        events
    }

    #[test]
    fn test_complete_lines() {
        let events = feed(&[b"data: {\"id\":1,\"text\":\"hello\"}\ndata: {\"id\":2,\"text\":\"world\"}\n"]);
        assert_eq!(
            events,
            vec![
                TestEvent { id: 1, text: "hello".to_string() },
                TestEvent { id: 2, text: "world".to_string() },
            ]
        );
    }

    #[test]
    fn test_json_split_across_chunks() {
        let events = feed(&[
            b"data: {\"id\":1,\"te",
            b"xt\":\"hello\"}\ndata: {\"id\":2",
            b",\"text\":\"world\"}\n",
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].text, "world");
    }

    #[test]
    fn test_incomplete_final_line_stays_buffered() {
        let mut buffer = String::from("data: {\"id\":1,\"text\":\"a\"}\ndata: {\"id\":2");
        let events = drain_lines::<TestEvent, _>(&mut buffer, &sse);
        assert_eq!(events.len(), 1);
        assert_eq!(buffer, "data: {\"id\":2");
    }

    #[test]
    fn test_crlf_blank_and_foreign_lines_are_skipped() {
        let events = feed(&[b"\r\ndata: {\"id\":1,\"text\":\"a\"}\r\n\r\nevent: ping\ndata: {\"id\":2,\"text\":\"b\"}\n"]);
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_malformed_json_does_not_break_stream() {
        let events = feed(&[b"data: {\"id\":1,\"text\":\"a\"}\ndata: {malformed}\ndata: {\"id\":2,\"text\":\"b\"}\n"]);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_single_byte_chunks() {
        let data = b"data: {\"id\":1,\"text\":\"hello\"}\n";
        let chunks: Vec<&[u8]> = data.chunks(1).collect();
        assert_eq!(feed(&chunks), vec![TestEvent { id: 1, text: "hello".to_string() }]);
    }

    #[test]
    fn test_client_with_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", "value".parse().unwrap());
        assert!(Client::with_headers(headers).is_ok());
    }
}
