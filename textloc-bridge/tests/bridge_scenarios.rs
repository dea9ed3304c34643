//! End-to-end behaviour of the completion bridge against the per-frame scheduler.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use textloc_bridge::{
    bridge, next_tick, wait_for, wait_for_ticks, AsyncHandle, Completion, FrameScheduler,
};

fn shared<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_callback_fires_on_the_tick_that_completes_the_handle() {
    let handle = Completion::<String>::pending();
    let mut scheduler = FrameScheduler::new();
    let deliveries = shared();

    let sink = Arc::clone(&deliveries);
    let registration = bridge(&handle, move |text| sink.lock().unwrap().push(text));

    let producer = handle.clone();
    scheduler.spawn(async move {
        next_tick().await;
        producer.complete("loaded".to_string()).unwrap();
    });

    scheduler.tick();
    assert!(deliveries.lock().unwrap().is_empty());
    assert!(registration.is_pending());

    scheduler.tick();
    assert_eq!(*deliveries.lock().unwrap(), vec!["loaded".to_string()]);
    assert!(registration.is_delivered());

    scheduler.tick();
    handle.notify();
    assert_eq!(deliveries.lock().unwrap().len(), 1);
}

#[test]
fn test_done_handle_delivers_before_bridge_returns() {
    let handle = Completion::completed("hello".to_string());
    let deliveries = shared();

    let sink = Arc::clone(&deliveries);
    bridge(&handle, move |text| sink.lock().unwrap().push(text));

    assert_eq!(*deliveries.lock().unwrap(), vec!["hello".to_string()]);
}

#[test]
fn test_registrations_receive_their_own_results_when_completed_in_reverse() {
    let first = Completion::<&'static str>::pending();
    let second = Completion::<&'static str>::pending();
    let deliveries = shared();

    let sink = Arc::clone(&deliveries);
    bridge(&first, move |value| sink.lock().unwrap().push(("first", value)));
    let sink = Arc::clone(&deliveries);
    bridge(&second, move |value| sink.lock().unwrap().push(("second", value)));

    second.complete("b").unwrap();
    first.complete("a").unwrap();

    assert_eq!(
        *deliveries.lock().unwrap(),
        vec![("second", "b"), ("first", "a")]
    );
}

#[test]
fn test_rebridging_a_finished_handle_delivers_the_same_result_to_each_callback() {
    let handle = Completion::<u64>::pending();
    let deliveries = shared();

    let sink = Arc::clone(&deliveries);
    bridge(&handle, move |value| sink.lock().unwrap().push(("early", value)));
    handle.complete(77).unwrap();

    let sink = Arc::clone(&deliveries);
    bridge(&handle, move |value| sink.lock().unwrap().push(("late", value)));
    let sink = Arc::clone(&deliveries);
    bridge(&handle, move |value| sink.lock().unwrap().push(("later", value)));

    assert_eq!(
        *deliveries.lock().unwrap(),
        vec![("early", 77), ("late", 77), ("later", 77)]
    );
}

#[test]
fn test_default_result_is_still_delivered() {
    let handle = Completion::<Option<String>>::pending();
    let deliveries = shared();

    let sink = Arc::clone(&deliveries);
    bridge(&handle, move |value| sink.lock().unwrap().push(value));
    handle.complete(None).unwrap();

    assert_eq!(*deliveries.lock().unwrap(), vec![None]);
}

#[test]
fn test_many_registrations_on_one_handle_each_fire_once() {
    let handle = Completion::<u32>::pending();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..16 {
        let counter = Arc::clone(&calls);
        bridge(&handle, move |value| {
            assert_eq!(value, 3);
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    handle.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    handle.complete(3).unwrap();
    handle.notify();
    assert_eq!(calls.load(Ordering::SeqCst), 16);
}

#[test]
fn test_completion_from_another_thread_runs_callback_there() {
    let handle = Completion::<u32>::pending();
    let delivered_on = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&delivered_on);
    let registration = bridge(&handle, move |value| {
        *slot.lock().unwrap() = Some((value, std::thread::current().id()));
    });

    let producer = handle.clone();
    let worker = std::thread::spawn(move || {
        producer.complete(12).unwrap();
        std::thread::current().id()
    });
    let worker_id = worker.join().unwrap();

    assert!(registration.is_delivered());
    assert_eq!(*delivered_on.lock().unwrap(), Some((12, worker_id)));
}

#[test]
fn test_racing_completion_and_registration_delivers_exactly_once() {
    for _ in 0..200 {
        let handle = Completion::<u32>::pending();
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = handle.clone();
        let worker = std::thread::spawn(move || producer.complete(1).unwrap());

        let counter = Arc::clone(&calls);
        bridge(&handle, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        worker.join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.listener_count(), 0);
    }
}

#[test]
fn test_wait_for_ticks_returns_the_result_seen_at_completion() {
    let handle = Completion::<String>::pending();
    let mut scheduler = FrameScheduler::new();
    let resumed_on = Rc::new(RefCell::new(None));

    let observed = handle.clone();
    let slot = Rc::clone(&resumed_on);
    scheduler.spawn(async move {
        let text = wait_for_ticks(observed).await;
        *slot.borrow_mut() = Some(text);
    });

    for _ in 0..3 {
        scheduler.tick();
    }
    assert!(resumed_on.borrow().is_none());

    handle.complete("ready".to_string()).unwrap();
    scheduler.tick();
    assert_eq!(resumed_on.borrow().as_deref(), Some("ready"));
}

#[tokio::test]
async fn test_wait_for_resolves_with_handle_result() {
    let handle = Completion::spawn(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        "from runtime".to_string()
    });

    let value = wait_for(handle.clone()).await;
    assert!(handle.is_done());
    assert_eq!(value, handle.result());
}
