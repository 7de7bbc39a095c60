// tests/debounce.rs

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use rekindle::engine::RuntimeEvent;
use rekindle::types::{ChangeClass, WatchEvent, WatchEventKind};
use rekindle::watch::{spawn_debouncer, ClassifiedChange, Debouncer};
use rekindle_test_utils::init_tracing;

fn change(path: &str, class: ChangeClass) -> ClassifiedChange {
    ClassifiedChange {
        event: WatchEvent::new(path, WatchEventKind::Write),
        class,
    }
}

fn drain(rx: &mut mpsc::Receiver<RuntimeEvent>) -> Vec<RuntimeEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn rearming_moves_the_deadline_and_keeps_the_latest() {
    let window = Duration::from_millis(500);
    let mut debouncer = Debouncer::new(window);
    let t0 = Instant::now();

    assert!(!debouncer.push("a", t0));
    assert_eq!(debouncer.deadline(), Some(t0 + window));
    assert!(debouncer.take_due(t0 + Duration::from_millis(499)).is_none());

    assert!(debouncer.push("b", t0 + Duration::from_millis(300)));
    assert!(debouncer.take_due(t0 + Duration::from_millis(600)).is_none());

    let (item, superseded) = debouncer
        .take_due(t0 + Duration::from_millis(800))
        .expect("due after the re-armed deadline");
    assert_eq!(item, "b");
    assert_eq!(superseded, 1);
    assert!(!debouncer.is_pending());
    assert_eq!(debouncer.deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn a_burst_dispatches_exactly_once_with_the_last_path() {
    init_tracing();

    let (changes_tx, changes_rx) = mpsc::channel(16);
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let _task = spawn_debouncer(Duration::from_millis(500), changes_rx, rt_tx);

    for i in 0..5 {
        changes_tx
            .send(change(&format!("pkg/file{i}.go"), ChangeClass::Reload))
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    // Last change was at ~400ms; nothing may fire before ~900ms.
    sleep(Duration::from_millis(300)).await;
    assert!(drain(&mut rt_rx).is_empty());

    sleep(Duration::from_millis(400)).await;
    assert_eq!(
        drain(&mut rt_rx),
        vec![RuntimeEvent::FileChanged {
            path: PathBuf::from("pkg/file4.go"),
            class: ChangeClass::Reload,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn the_last_event_decides_the_class() {
    let (changes_tx, changes_rx) = mpsc::channel(16);
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let _task = spawn_debouncer(Duration::from_millis(200), changes_rx, rt_tx);

    changes_tx.send(change("main.go", ChangeClass::Reload)).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    changes_tx
        .send(change("static/app.css", ChangeClass::Refresh))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rt_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        RuntimeEvent::FileChanged {
            path: PathBuf::from("static/app.css"),
            class: ChangeClass::Refresh,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn quiet_periods_separate_dispatches() {
    let (changes_tx, changes_rx) = mpsc::channel(16);
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let _task = spawn_debouncer(Duration::from_millis(200), changes_rx, rt_tx);

    changes_tx.send(change("a.go", ChangeClass::Reload)).await.unwrap();
    sleep(Duration::from_millis(500)).await;
    changes_tx.send(change("b.go", ChangeClass::Reload)).await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let paths: Vec<PathBuf> = drain(&mut rt_rx)
        .into_iter()
        .map(|ev| match ev {
            RuntimeEvent::FileChanged { path, .. } => path,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(paths, vec![PathBuf::from("a.go"), PathBuf::from("b.go")]);
}

#[tokio::test(start_paused = true)]
async fn closing_the_input_discards_the_pending_change() {
    let (changes_tx, changes_rx) = mpsc::channel(16);
    let (rt_tx, mut rt_rx) = mpsc::channel(16);
    let task = spawn_debouncer(Duration::from_millis(200), changes_rx, rt_tx);

    changes_tx.send(change("a.go", ChangeClass::Reload)).await.unwrap();
    drop(changes_tx);

    task.await.unwrap();
    assert!(drain(&mut rt_rx).is_empty());
}
