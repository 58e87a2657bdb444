//! WebSocket adapter for relay sessions

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::{Sink, Stream};

use edgerelay_relay::{TransportError, TransportFrame};

/// An upgraded WebSocket seen as a relay transport.
///
/// Binary and text messages are delivered as bytes. Ping and pong are
/// answered by the WebSocket layer and never reach the session. A close
/// frame ends the stream.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

fn protocol_error(e: axum::Error) -> TransportError {
    TransportError::Protocol(e.to_string())
}

impl Stream for WsTransport {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let message = match ready!(Pin::new(&mut self.socket).poll_next(cx)) {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Poll::Ready(Some(Err(protocol_error(e)))),
                None => return Poll::Ready(None),
            };

            match message {
                Message::Binary(data) => return Poll::Ready(Some(Ok(data))),
                Message::Text(text) => {
                    return Poll::Ready(Some(Ok(Bytes::copy_from_slice(text.as_str().as_bytes()))))
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return Poll::Ready(None),
            }
        }
    }
}

impl Sink<TransportFrame> for WsTransport {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.socket).poll_ready(cx).map_err(protocol_error)
    }

    fn start_send(mut self: Pin<&mut Self>, frame: TransportFrame) -> Result<(), Self::Error> {
        let message = match frame {
            TransportFrame::Binary(data) => Message::Binary(data),
            // Reason stays empty so closures carry no internal detail
            TransportFrame::Close(code) => Message::Close(Some(CloseFrame {
                code: code.as_u16(),
                reason: Utf8Bytes::from_static(""),
            })),
        };
        Pin::new(&mut self.socket).start_send(message).map_err(protocol_error)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.socket).poll_flush(cx).map_err(protocol_error)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.socket).poll_close(cx).map_err(protocol_error)
    }
}
