//! Liveness heartbeat.
//!
//! Emits a keep-alive on the reliable channel at a fixed interval. The
//! companion idle-read timeout lives in the reliable pipeline; together
//! they surface dead connections (NAT state loss, half-open TCP) that the
//! stream alone would take minutes to notice.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use skirmish_netproto::{Packet, SessionContext, codec_tcp::encode_wire, seal::seal_packet};
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::WriteCmd;

pub(crate) fn spawn(
    reliable_tx: mpsc::Sender<WriteCmd>,
    session: Arc<SessionContext>,
    cancel: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the cadence
        // starts one interval after connect.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let packet = Packet::KeepAlive {
                t_ms: started.elapsed().as_millis() as u32,
            };
            let key = session.current();
            let frame = match seal_packet(&packet, key.as_deref()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("failed to seal keep-alive: {e}");
                    continue;
                }
            };

            if reliable_tx
                .send(WriteCmd::Frame(Bytes::copy_from_slice(&encode_wire(&frame))))
                .await
                .is_err()
            {
                // Writer is gone; the notifier has already reported it.
                break;
            }
        }

        debug!("heartbeat task stopped");
    })
}
