use bytes::Bytes;
use ring::hmac;
use skirmish_netproto::{Packet, codec_tcp::encode_wire, seal::seal_packet};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use super::inbound::OutboundTx;

/// Spawn a writer task that drains framed bytes into the TLS stream.
///
/// Exits when the channel closes or a write fails; either way the stream
/// is shut down so the peer sees a clean EOF.
pub fn spawn_writer<W>(mut write: W, mut rx: mpsc::Receiver<Bytes>) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = write.shutdown().await;
    })
}

/// Seal a packet under `key`, add the stream length prefix and queue it on
/// a connection's reliable channel.
pub async fn send_packet(
    tx: &OutboundTx,
    packet: &Packet,
    key: Option<&hmac::Key>,
) -> anyhow::Result<()> {
    let frame = seal_packet(packet, key)?;
    tx.send(Bytes::copy_from_slice(&encode_wire(&frame)))
        .await
        .map_err(|_| anyhow::anyhow!("connection closed"))?;
    Ok(())
}
