// In-process MQTT 3.1.1 broker for tests:
// - one task per connection; a client only sees its own publishes echoed back
// - speaks just enough of the protocol for rumqttc (CONNECT, SUBSCRIBE,
//   PUBLISH QoS 0-2, PINGREQ, DISCONNECT)
// - acks can be withheld to keep QoS 1/2 publishes in flight
use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::topic_matches;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Behavior {
    pub send_connack: bool,
    pub ack_publishes: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            send_connack: true,
            ack_publishes: true,
        }
    }
}

pub(crate) struct TestBroker {
    pub port: u16,
    task: JoinHandle<()>,
}

impl TestBroker {
    pub async fn start() -> Self {
        Self::start_with(Behavior::default()).await
    }

    pub async fn start_with(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test broker");
        let port = listener.local_addr().expect("test broker addr").port();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior));
            }
        });
        Self { port, task }
    }

    pub fn uri(&self, topic: &str) -> String {
        format!("mqtt://127.0.0.1:{}/{topic}", self.port)
    }

    pub fn options(&self) -> rumqttc::MqttOptions {
        rumqttc::MqttOptions::new(Uuid::new_v4().to_string(), "127.0.0.1", self.port)
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A port nothing is listening on.
pub(crate) async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

async fn serve(mut stream: TcpStream, behavior: Behavior) -> io::Result<()> {
    let mut filters: Vec<String> = Vec::new();
    loop {
        let (header, body) = read_packet(&mut stream).await?;
        match header >> 4 {
            // CONNECT
            1 => {
                if behavior.send_connack {
                    stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await?;
                }
            }
            // PUBLISH
            3 => {
                let qos = (header >> 1) & 0x03;
                let (topic, mut pos) = read_string(&body, 0);
                let pkid = if qos > 0 {
                    let id = [body[pos], body[pos + 1]];
                    pos += 2;
                    Some(id)
                } else {
                    None
                };
                if behavior.ack_publishes {
                    match (qos, pkid) {
                        (1, Some([hi, lo])) => stream.write_all(&[0x40, 0x02, hi, lo]).await?,
                        (2, Some([hi, lo])) => stream.write_all(&[0x50, 0x02, hi, lo]).await?,
                        _ => {}
                    }
                }
                if filters.iter().any(|filter| topic_matches(filter, &topic)) {
                    let mut echo = encode_string(&topic);
                    echo.extend_from_slice(&body[pos..]);
                    stream.write_all(&encode_packet(0x30, &echo)).await?;
                }
            }
            // PUBREL
            6 => stream.write_all(&[0x70, 0x02, body[0], body[1]]).await?,
            // SUBSCRIBE
            8 => {
                let mut pos = 2;
                let mut granted = 0;
                while pos < body.len() {
                    let (filter, next) = read_string(&body, pos);
                    filters.push(filter);
                    pos = next + 1;
                    granted += 1;
                }
                let mut suback = vec![body[0], body[1]];
                suback.extend(std::iter::repeat_n(0x00, granted));
                stream.write_all(&encode_packet(0x90, &suback)).await?;
            }
            // PINGREQ
            12 => stream.write_all(&[0xD0, 0x00]).await?,
            // DISCONNECT
            14 => return Ok(()),
            _ => {}
        }
    }
}

async fn read_packet(stream: &mut TcpStream) -> io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        len |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}

fn read_string(body: &[u8], pos: usize) -> (String, usize) {
    let len = usize::from(u16::from_be_bytes([body[pos], body[pos + 1]]));
    let start = pos + 2;
    let value = String::from_utf8_lossy(&body[start..start + len]).into_owned();
    (value, start + len)
}

fn encode_string(value: &str) -> Vec<u8> {
    let mut out = (value.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(value.as_bytes());
    out
}

fn encode_packet(header: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![header];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
    out.extend_from_slice(body);
    out
}
