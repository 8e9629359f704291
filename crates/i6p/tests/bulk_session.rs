//! Bulk transfer across an authenticated QUIC session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use i6p::node::Node;
use i6p::session::SessionOpener;
use i6p::{BulkReceiver, BulkSender, KeyPair, TransferConfig};
use i6p_transfer::batch::try_read_batch;

const DEADLINE: Duration = Duration::from_secs(10);

fn payload(len: usize) -> Vec<u8> {
    // Mildly compressible, never constant.
    (0..len).map(|i| ((i / 7) % 251) as u8).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_send_over_session_round_trips() -> anyhow::Result<()> {
    init_tracing();
    let mut server = Node::new(KeyPair::generate(), BTreeMap::new());
    server.listen("[::1]:0".parse()?)?;
    let addr = server.listen_addr().unwrap();
    let client = Node::new(KeyPair::generate(), BTreeMap::new());

    let chunk_size = 4096usize;
    let data = payload(chunk_size * 12 + 345);
    let expected_chunks = data.len().div_ceil(chunk_size);

    let receiver = Arc::new(BulkReceiver::new());
    receiver.set_expected_chunks(expected_chunks);

    // Server: accept the session, then drain inbound streams into the
    // receiver until every chunk has arrived.
    let server_receiver = Arc::clone(&receiver);
    let server_task = tokio::spawn(async move {
        let session = timeout(DEADLINE, server.accept()).await.unwrap().unwrap();
        let mut drains = Vec::new();
        while !server_receiver.is_complete() {
            tokio::select! {
                accepted = session.accept_stream() => {
                    let mut stream = accepted.unwrap();
                    let receiver = Arc::clone(&server_receiver);
                    drains.push(tokio::spawn(async move {
                        while let Ok(Some(batch)) = try_read_batch(&mut stream).await {
                            receiver.receive_batch(&batch).unwrap();
                        }
                    }));
                }
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
        }
        for drain in drains {
            let _ = drain.await;
        }
    });

    let session = Arc::new(timeout(DEADLINE, client.dial(addr)).await??);
    let sender = BulkSender::new(
        SessionOpener::new(Arc::clone(&session)),
        TransferConfig {
            chunk_size,
            parallel_streams: 4,
            parallel_workers: 2,
            ..TransferConfig::default()
        },
    );

    let root = timeout(DEADLINE, sender.send(&data, CancellationToken::new())).await??;
    sender.close().await;

    timeout(DEADLINE, server_task).await??;

    assert!(receiver.is_complete());
    let assembled = receiver.assemble(Some(&root))?;
    assert_eq!(assembled, data);
    Ok(())
}
