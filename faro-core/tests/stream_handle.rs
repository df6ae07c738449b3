use faro_core::stream::StreamHandle;

#[tokio::test(flavor = "multi_thread")]
async fn streamhandle_stop_graceful() {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        // Wait for stop signal, then signal completion
        let _ = stop_rx.await;
        let _ = done_tx.send(());
    });

    let handle = StreamHandle::new(task, stop_tx);
    handle.stop().await; // should await task completion

    // Verify the task completed due to graceful stop, not abort
    let _ = tokio::time::timeout(std::time::Duration::from_millis(100), done_rx)
        .await
        .expect("task did not complete after stop()");
}

#[tokio::test(flavor = "multi_thread")]
async fn streamhandle_drop_aborts_task() {
    let (stop_tx, _stop_rx) = tokio::sync::oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        // Ignores the stop signal entirely; only abort can end it.
        std::future::pending::<()>().await;
    });
    let probe = task.abort_handle();

    let handle = StreamHandle::new(task, stop_tx);
    drop(handle);

    tokio::time::timeout(std::time::Duration::from_millis(200), async {
        while !probe.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("dropping the handle should abort the task");
}

#[tokio::test(flavor = "multi_thread")]
async fn streamhandle_is_finished_tracks_task() {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let _ = stop_rx.await;
    });

    let handle = StreamHandle::new(task, stop_tx);
    assert!(!handle.is_finished());
    handle.stop().await;
}
