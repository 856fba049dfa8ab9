use async_trait::async_trait;
use futures_util::{
	sink::SinkExt,
	stream::{SplitSink, SplitStream, StreamExt},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
	connect_async,
	tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message as TungsteniteMessage},
	MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const NORMAL_CLOSURE: u16 = 1000;
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum TransportError {
	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("Dial timed out after {0:?}")]
	DialTimeout(Duration),

	#[error("Connection closed (code {code:?})")]
	Closed { code: Option<u16> },

	#[error("Connection reset: {0}")]
	Reset(String),
}

impl TransportError {
	pub fn is_normal_closure(&self) -> bool {
		matches!(self, Self::Closed { code: Some(NORMAL_CLOSURE) })
	}
}

/// Opens physical connections to a push endpoint
#[async_trait]
pub trait Connector: Send + Sync {
	async fn open(&self, url: &str) -> Result<Arc<dyn Connection>, TransportError>;
}

/// One open socket. `read` is only ever called by a single reader task;
/// `close` may be called from anywhere, any number of times.
#[async_trait]
pub trait Connection: Send + Sync {
	/// Next text frame. Control and binary frames are consumed internally.
	async fn read(&self) -> Result<String, TransportError>;

	async fn close(&self);
}

/// Production connector over `tokio-tungstenite`
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
	async fn open(&self, url: &str) -> Result<Arc<dyn Connection>, TransportError> {
		let (ws_stream, _) = connect_async(url).await?;
		let (sink, stream) = ws_stream.split();

		Ok(Arc::new(WsConnection {
			sink: Mutex::new(sink),
			stream: Mutex::new(stream),
			closed: AtomicBool::new(false),
		}))
	}
}

pub struct WsConnection {
	sink: Mutex<SplitSink<WsStream, TungsteniteMessage>>,
	stream: Mutex<SplitStream<WsStream>>,
	closed: AtomicBool,
}

#[async_trait]
impl Connection for WsConnection {
	async fn read(&self) -> Result<String, TransportError> {
		let mut stream = self.stream.lock().await;

		loop {
			match stream.next().await {
				Some(Ok(TungsteniteMessage::Text(text))) => return Ok(text.as_str().to_owned()),
				Some(Ok(TungsteniteMessage::Close(frame))) => {
					let code = frame.map(|f| u16::from(f.code));
					debug!("WebSocket close frame received (code {:?})", code);
					return Err(TransportError::Closed { code });
				}
				Some(Ok(TungsteniteMessage::Binary(data))) => {
					trace!("Ignoring {} byte binary frame", data.len());
				}
				Some(Ok(_)) => {} // ping/pong are answered by tungstenite
				Some(Err(e)) => return Err(TransportError::WebSocket(e)),
				None => return Err(TransportError::Reset("stream ended without close frame".to_string())),
			}
		}
	}

	async fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}

		let mut sink = self.sink.lock().await;
		let frame = CloseFrame {
			code: CloseCode::Normal,
			reason: String::new().into(),
		};

		let goodbye = async {
			let _ = sink.send(TungsteniteMessage::Close(Some(frame))).await;
			let _ = sink.close().await;
		};
		if tokio::time::timeout(CLOSE_FRAME_TIMEOUT, goodbye).await.is_err() {
			debug!("Timed out sending close frame");
		}
	}
}
