//! Re-framing of engine SSE streams into gateway events.
//!
//! The engine body is split into lines, `data:` payloads are decoded, and each is
//! mapped to zero or one gateway event. A terminal event is appended when the engine
//! finishes cleanly. A transport error or an undecodable payload ends the stream with
//! an `Err` item and no terminal event.
//!
//! Dropping an event stream drops the engine body with it, which closes the upstream
//! connection.

use std::collections::VecDeque;
use std::fmt::Display;

use aurora_common::sse::{data_payload, LineDecoder, DONE_SENTINEL};
use aurora_common::{ChatEvent, GenerateEvent};
use futures_util::stream::{self, BoxStream, StreamExt};
use futures_util::Stream;

use crate::engine::{ChatCompletionsChunk, CompletionChunk};
use crate::error::{Error, Result};

pub type EventStream<T> = BoxStream<'static, Result<T>>;

/// What a single engine payload turns into.
enum Frame<T> {
    Skip,
    Emit(T),
    /// The engine is done; emit the optional last event, then the terminal one.
    Finish(Option<T>),
}

struct Lines<E> {
    body: BoxStream<'static, std::result::Result<Vec<u8>, E>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Non-empty `data:` payloads of an SSE byte stream, in order.
pub fn data_payloads<S, B, E>(body: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display + Send + 'static,
{
    let state = Lines {
        body: body.map(|r| r.map(|b| b.as_ref().to_vec())).boxed(),
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                match data_payload(&line) {
                    Some(payload) if !payload.is_empty() => {
                        return Some((Ok(payload.to_string()), st));
                    }
                    _ => continue,
                }
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.decoder.push(&chunk);
                    st.pending.extend(lines);
                }
                Some(Err(e)) => {
                    st.done = true;
                    st.pending.clear();
                    return Some((
                        Err(Error::Upstream(format!("engine stream failed: {}", e))),
                        st,
                    ));
                }
                None => {
                    st.done = true;
                    let last = st.decoder.finish();
                    st.pending.extend(last);
                }
            }
        }
    })
    .boxed()
}

struct Reframe<T, F> {
    label: String,
    payloads: BoxStream<'static, Result<String>>,
    step: F,
    queued: VecDeque<T>,
    terminal: Option<T>,
    finished: bool,
}

impl<T, F> Drop for Reframe<T, F> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                "{} stream dropped before completion, closing engine connection",
                self.label
            );
        }
    }
}

fn reframe<T, F>(
    label: String,
    payloads: BoxStream<'static, Result<String>>,
    terminal: T,
    step: F,
) -> EventStream<T>
where
    T: Send + 'static,
    F: FnMut(&str) -> Result<Frame<T>> + Send + 'static,
{
    let state = Reframe {
        label,
        payloads,
        step,
        queued: VecDeque::new(),
        terminal: Some(terminal),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.queued.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }
            let outcome = match st.payloads.next().await {
                None => Ok(Frame::Finish(None)),
                Some(Ok(payload)) => (st.step)(&payload),
                Some(Err(e)) => Err(e),
            };
            match outcome {
                Ok(Frame::Skip) => {}
                Ok(Frame::Emit(event)) => return Some((Ok(event), st)),
                Ok(Frame::Finish(last)) => {
                    st.finished = true;
                    st.queued.extend(last);
                    st.queued.extend(st.terminal.take());
                }
                Err(e) => {
                    st.finished = true;
                    st.terminal = None;
                    return Some((Err(e), st));
                }
            }
        }
    })
    .boxed()
}

/// Gateway events for a streaming `/completion` body.
///
/// Non-empty `content` becomes a `{model, response, done: false}` event. The chunk
/// flagged `stop`/`stopped` (or the end of the body) is followed by `{model, done: true}`.
pub fn generate_events<S, B, E>(model: &str, body: S) -> EventStream<GenerateEvent>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display + Send + 'static,
{
    let name = model.to_string();
    reframe(
        format!("generate ({})", model),
        data_payloads(body),
        GenerateEvent::done(model),
        move |payload| {
            let chunk: CompletionChunk = serde_json::from_str(payload)
                .map_err(|e| Error::Upstream(format!("invalid completion chunk: {}", e)))?;
            let is_final = chunk.is_final();
            let event = (!chunk.content.is_empty())
                .then(|| GenerateEvent::chunk(&name, chunk.content));
            Ok(match (is_final, event) {
                (true, event) => Frame::Finish(event),
                (false, Some(event)) => Frame::Emit(event),
                (false, None) => Frame::Skip,
            })
        },
    )
}

/// Gateway events for a streaming `/v1/chat/completions` body.
///
/// Each non-empty `choices[0].delta.content` becomes an assistant message event.
/// `[DONE]` (or the end of the body) is followed by `{model, done: true}`; anything
/// after `[DONE]` is ignored.
pub fn chat_events<S, B, E>(model: &str, body: S) -> EventStream<ChatEvent>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display + Send + 'static,
{
    let name = model.to_string();
    reframe(
        format!("chat ({})", model),
        data_payloads(body),
        ChatEvent::done(model),
        move |payload| {
            if payload == DONE_SENTINEL {
                return Ok(Frame::Finish(None));
            }
            let chunk: ChatCompletionsChunk = serde_json::from_str(payload)
                .map_err(|e| Error::Upstream(format!("invalid chat chunk: {}", e)))?;
            Ok(match chunk.into_content().filter(|c| !c.is_empty()) {
                Some(content) => Frame::Emit(ChatEvent::delta(&name, content)),
                None => Frame::Skip,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    fn body(chunks: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> {
        let chunks: Vec<_> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        stream::iter(chunks)
    }

    async fn collect<T>(events: EventStream<T>) -> Vec<Result<T>> {
        events.collect().await
    }

    #[tokio::test]
    async fn test_payloads_skip_non_data_lines() {
        let payloads: Vec<_> = data_payloads(body(&[
            ": keep-alive\n",
            "event: message\ndata: {\"a\"",
            ":1}\n\ndata: \n",
            "data: last",
        ]))
        .collect()
        .await;
        let payloads: Vec<String> = payloads.into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(payloads, vec!["{\"a\":1}", "last"]);
    }

    #[tokio::test]
    async fn test_generate_stream_concatenates() {
        let events = collect(generate_events(
            "glm",
            body(&[
                "data: {\"content\":\"Hel\",\"stop\":false}\n\n",
                "data: {\"content\":\"lo\",\"stop\":false}\n\n",
                "data: {\"content\":\"\",\"stop\":true}\n\n",
            ]),
        ))
        .await;

        let events: Vec<GenerateEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 3);
        assert!(events[..2].iter().all(|e| !e.done));
        assert_eq!(events[2], GenerateEvent::done("glm"));

        let text: String = events.iter().filter_map(|e| e.response.clone()).collect();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_generate_final_chunk_with_content() {
        let events = collect(generate_events(
            "glm",
            body(&["data: {\"content\":\"Hi\",\"stopped\":true}\n\ndata: {\"content\":\"x\"}\n\n"]),
        ))
        .await;

        let events: Vec<GenerateEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                GenerateEvent::chunk("glm", "Hi".to_string()),
                GenerateEvent::done("glm")
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_body_end_without_stop_still_terminates() {
        let events = collect(generate_events("glm", body(&["data: {\"content\":\"Hi\"}"]))).await;
        let events: Vec<GenerateEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert!(events[1].done);
    }

    #[tokio::test]
    async fn test_chat_stream_stops_at_done() {
        let events = collect(chat_events(
            "glm",
            body(&[
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
                "data: [DONE]\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
            ]),
        ))
        .await;

        let events: Vec<ChatEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                ChatEvent::delta("glm", "Hi".to_string()),
                ChatEvent::delta("glm", " there".to_string()),
                ChatEvent::done("glm"),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_chunk_ends_stream_without_terminal_event() {
        let events = collect(chat_events(
            "glm",
            body(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
                "data: {not json}\n\n",
                "data: [DONE]\n\n",
            ]),
        ))
        .await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream_without_terminal_event() {
        let items: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from("data: {\"content\":\"Hel\"}\n\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from("data: {\"content\":\"lo\"}\n\n")),
        ];
        let events = collect(generate_events("glm", stream::iter(items))).await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        match &events[1] {
            Err(Error::Upstream(msg)) => assert!(msg.contains("reset")),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_engine_body() {
        let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, io::Error>>(4);
        let mut events = generate_events("glm", ReceiverStream::new(rx));

        tx.send(Ok(Bytes::from("data: {\"content\":\"Hel\"}\n\n")))
            .await
            .unwrap();
        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.response.as_deref(), Some("Hel"));
        assert!(!tx.is_closed());

        drop(events);
        assert!(tx.is_closed());
    }
}
