//! The exchange loop itself. The *connector* side calls [`run_exchange`]
//! with `start_sending = true`; the *acceptor* side calls it with `false`.
//! Both sides run the identical loop after that:
//!
//! ```text
//! if start_sending: SEND-PHASE
//! while keep_send or keep_recv:
//!     RECEIVE-PHASE
//!     SEND-PHASE
//! ```
//!
//! Neither phase knows about the store, the crypto layer, or where messages
//! come from — a [`MessageSource`] supplies outbound user messages and a
//! callback receives inbound ones. Wiring those to persistent storage is
//! the caller's job.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use depeche_types::{Address, DepecheError, DepecheMessage, MessageContainer};

/// A `user_message`'s payload, stripped of its wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessagePayload {
    pub to_address: Address,
    pub send_time: DateTime<Utc>,
    pub contents: String,
}

/// Supplies the next outbound user message, or `None` once exhausted.
/// `iter` in spec.md §4.6 is explicitly finite — there is no mechanism for
/// a source to un-exhaust itself mid-exchange.
pub trait MessageSource {
    fn next_message(&mut self) -> Option<UserMessagePayload>;
}

impl<F> MessageSource for F
where
    F: FnMut() -> Option<UserMessagePayload>,
{
    fn next_message(&mut self) -> Option<UserMessagePayload> {
        self()
    }
}

/// Run one side of the exchange loop over `stream` until both peers have
/// signaled `no_more_data`, then shut the connection down.
pub async fn run_exchange<S, Src, F>(
    stream: &mut S,
    start_sending: bool,
    mut outbound: Src,
    mut on_message_received: F,
) -> Result<(), DepecheError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    Src: MessageSource,
    F: FnMut(UserMessagePayload) -> Result<(), DepecheError>,
{
    let mut keep_send = true;
    let mut keep_recv = true;

    if start_sending {
        send_phase(stream, &mut keep_send, &mut outbound).await?;
    }

    while keep_send || keep_recv {
        receive_phase(stream, &mut keep_send, &mut keep_recv, &mut on_message_received).await?;
        send_phase(stream, &mut keep_send, &mut outbound).await?;
    }

    let _ = stream.shutdown().await;
    Ok(())
}

async fn send_phase<S, Src>(stream: &mut S, keep_send: &mut bool, outbound: &mut Src) -> Result<(), DepecheError>
where
    S: AsyncWrite + Unpin,
    Src: MessageSource,
{
    let message = if *keep_send {
        match outbound.next_message() {
            Some(payload) => Some(DepecheMessage::new_user_message(
                payload.to_address,
                payload.send_time,
                payload.contents,
            )),
            None => {
                *keep_send = false;
                None
            }
        }
    } else {
        None
    };

    let message = message.unwrap_or_else(DepecheMessage::new_no_more_data);
    let container = MessageContainer::single(message);
    depeche_proto::send(stream, container.serialize().as_bytes()).await
}

async fn receive_phase<S, F>(
    stream: &mut S,
    keep_send: &mut bool,
    keep_recv: &mut bool,
    on_message_received: &mut F,
) -> Result<(), DepecheError>
where
    S: AsyncRead + Unpin,
    F: FnMut(UserMessagePayload) -> Result<(), DepecheError>,
{
    let bytes = depeche_proto::read(stream).await?;
    let text = String::from_utf8(bytes).map_err(|e| DepecheError::MalformedPayload(e.to_string()))?;
    let container = MessageContainer::deserialize(&text)?;

    for message in container.0 {
        match message {
            DepecheMessage::StopSending { .. } => *keep_send = false,
            DepecheMessage::NoMoreData { .. } => *keep_recv = false,
            DepecheMessage::UserMessage {
                to_address,
                send_time,
                contents,
                ..
            } => {
                let payload = UserMessagePayload {
                    to_address,
                    send_time,
                    contents,
                };
                if let Err(e) = on_message_received(payload) {
                    tracing::warn!(error = %e, "on_message_received failed; exchange continues");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn payload(contents: &str) -> UserMessagePayload {
        UserMessagePayload {
            to_address: Address::generate(),
            send_time: Utc::now(),
            contents: contents.to_string(),
        }
    }

    #[tokio::test]
    async fn exchanges_messages_both_directions_and_terminates() {
        let (mut a, mut b) = tokio::io::duplex(256 * 1024);

        let mut alpha_outbound = vec![payload("alpha-1"), payload("alpha-2")].into_iter();
        let mut beta_outbound = vec![payload("beta-1")].into_iter();

        let alpha_received = Arc::new(Mutex::new(Vec::new()));
        let beta_received = Arc::new(Mutex::new(Vec::new()));
        let alpha_received_clone = alpha_received.clone();
        let beta_received_clone = beta_received.clone();

        let connector = tokio::spawn(async move {
            run_exchange(
                &mut a,
                true,
                move || alpha_outbound.next(),
                move |msg: UserMessagePayload| {
                    alpha_received_clone.lock().unwrap().push(msg.contents);
                    Ok(())
                },
            )
            .await
        });

        let acceptor = tokio::spawn(async move {
            run_exchange(
                &mut b,
                false,
                move || beta_outbound.next(),
                move |msg: UserMessagePayload| {
                    beta_received_clone.lock().unwrap().push(msg.contents);
                    Ok(())
                },
            )
            .await
        });

        connector.await.unwrap().unwrap();
        acceptor.await.unwrap().unwrap();

        assert_eq!(*beta_received.lock().unwrap(), vec!["alpha-1", "alpha-2"]);
        assert_eq!(*alpha_received.lock().unwrap(), vec!["beta-1"]);
    }

    #[tokio::test]
    async fn empty_sources_terminate_immediately() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        let connector = tokio::spawn(async move { run_exchange(&mut a, true, || None, |_| Ok(())).await });
        let acceptor = tokio::spawn(async move { run_exchange(&mut b, false, || None, |_| Ok(())).await });

        connector.await.unwrap().unwrap();
        acceptor.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn receiver_callback_error_does_not_abort_exchange() {
        let (mut a, mut b) = tokio::io::duplex(128 * 1024);
        let mut alpha_outbound = vec![payload("alpha-1")].into_iter();

        let connector =
            tokio::spawn(async move { run_exchange(&mut a, true, move || alpha_outbound.next(), |_| Ok(())).await });
        let acceptor = tokio::spawn(async move {
            run_exchange(&mut b, false, || None, |_| {
                Err(DepecheError::MalformedPayload("callback failure".into()))
            })
            .await
        });

        connector.await.unwrap().unwrap();
        acceptor.await.unwrap().unwrap();
    }
}
