//! Delivery pipeline: payload in, spool, scheduler, printer bytes out

use chrono::DateTime;
use fax_printer::{MemoryPrinter, PrinterProfile};
use fax_station::buttons::ButtonEvent;
use fax_station::clock::LocalClock;
use fax_station::netinfo::NetworkInspector;
use fax_station::printing::{CommandCue, Renderer, Scheduler, SchedulerConfig};
use fax_station::spool::Spool;
use fax_station::transport::spool_and_signal;
use shared::FaxEnvelope;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn black_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::GrayImage::from_pixel(width, height, image::Luma([0u8]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn find(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn test_fax_is_spooled_printed_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let spool = Arc::new(Spool::open(dir.path()).await.unwrap());
    let shutdown = CancellationToken::new();
    let (spool_tx, spool_rx) = mpsc::channel(16);
    let (_button_tx, button_rx) = mpsc::channel::<ButtonEvent>(16);

    let printer = MemoryPrinter::new();
    let scheduler = Scheduler::new(
        spool.clone(),
        printer.clone(),
        Renderer::new(PrinterProfile::default(), 32),
        None::<CommandCue>,
        Arc::new(LocalClock::default()),
        Arc::new(NetworkInspector::with_source(Duration::from_secs(60), Vec::new)),
        SchedulerConfig::default(),
        shutdown.clone(),
    );

    let timestamp = DateTime::parse_from_rfc3339("2024-02-29T08:15:00-05:00").unwrap();
    let payload = FaxEnvelope::new(timestamp, "Alice", "Hello")
        .with_picture(black_png(16, 2))
        .to_bytes()
        .unwrap();

    let before = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;

    let pipeline = {
        let spool = spool.clone();
        let probe = printer.clone();
        let shutdown = shutdown.clone();
        async move {
            let id = spool_and_signal(&spool, &payload, &spool_tx).await.unwrap();
            assert!(id.key() >= before);
            assert!(dir.path().join(id.file_name()).exists());

            tokio::time::timeout(Duration::from_secs(5), async {
                while spool.oldest().await.unwrap().is_some() || probe.contents().is_empty() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("fax was not printed");
            shutdown.cancel();
            dir
        }
    };
    let (_, _dir) = tokio::join!(scheduler.run(spool_rx, button_rx), pipeline);

    assert!(spool.list_pending().await.unwrap().is_empty());

    let out = printer.contents();
    let hello = find(&out, b"Hello\n");
    let rows = find(&out, b"\x1b*\x08\x30\x00\xff\xff\x00");
    assert_eq!(hello.len(), 1);
    assert_eq!(rows.len(), 2);
    assert!(hello[0] < rows[0]);
    assert!(out.ends_with(b"\n\n\n\n"));
}
