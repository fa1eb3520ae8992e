//! Kept in its own test binary: the hook is process-wide.

use std::net::Ipv4Addr;
use std::sync::Arc;

use georegion::unhandled::{self, CallbackPanic};
use georegion::{DatabaseHandle, Edition, MemoryDatabase, Region, RegionResult};
use parking_lot::Mutex;
use tokio::sync::mpsc;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_panic_goes_to_hook() {
    let (tx, mut rx) = mpsc::unbounded_channel::<CallbackPanic>();
    let tx = Mutex::new(tx);
    unhandled::set_hook(move |failure| {
        let _ = tx.lock().send(failure.clone());
    });

    let mut db = MemoryDatabase::new(Edition::REGION_REV0);
    db.insert(Ipv4Addr::new(8, 8, 8, 8), "US", "CA");
    let region = Region::new(DatabaseHandle::from_database("memory", db).unwrap());

    let seen = Arc::new(Mutex::new(None::<RegionResult>));
    let seen_in_callback = seen.clone();
    region
        .lookup("8.8.8.8", move |found| {
            *seen_in_callback.lock() = found;
            panic!("callback blew up");
        })
        .unwrap();

    let failure = rx.recv().await.expect("hook should receive the panic");
    assert_eq!(failure.host, "8.8.8.8");
    assert_eq!(failure.message, "callback blew up");
    assert_eq!(*seen.lock(), Some(RegionResult::new("US", "CA")));
    assert_eq!(region.handle().in_flight(), 0);

    // the runtime keeps serving lookups afterwards
    assert_eq!(
        region.lookup_async("8.8.8.8").await.unwrap(),
        Some(RegionResult::new("US", "CA"))
    );

    unhandled::clear_hook();
    region.lookup("8.8.8.8", |_| panic!("logged only")).unwrap();
    assert_eq!(region.lookup_async("0.0.0.0").await.unwrap(), None);
}
