//! Cross-module coverage for the router/queue/message stack: multiple
//! producer threads delivering through one `Router`, plus the
//! empty/non-shutdown vs. shutdown destruction distinction.

use jaufs_primitives::error::Error;
use jaufs_primitives::message::{Location, Message, MessageType};
use jaufs_primitives::queue::MessageQueue;
use jaufs_primitives::router::Router;
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_producers_deliver_in_order_per_sender() {
    let mut router: Router<u32> = Router::new();
    router
        .add(Location::Main, MessageQueue::new().unwrap())
        .unwrap();
    let router = Arc::new(router);

    let producer = router.clone();
    let handle = thread::spawn(move || {
        for i in 0..50 {
            producer
                .send(Message::new(
                    MessageType::Normal,
                    0,
                    Location::General,
                    Location::Main,
                    i,
                ))
                .unwrap();
        }
    });
    handle.join().unwrap();

    let mut seen = Vec::new();
    for _ in 0..50 {
        seen.push(router.recv(Location::Main).unwrap().payload);
    }
    assert_eq!(seen, (0..50).collect::<Vec<_>>());
}

#[test]
fn router_close_distinguishes_shutdown_state() {
    let mut router: Router<u32> = Router::new();
    router
        .add(Location::Network, MessageQueue::new().unwrap())
        .unwrap();

    router
        .send(Message::new(
            MessageType::Normal,
            0,
            Location::Main,
            Location::Network,
            1,
        ))
        .unwrap();

    assert!(matches!(router.close(), Err(Error::TmNotShutdown)));

    router.try_recv(Location::Network).unwrap();
    router.shutdown_all();
    assert!(router.close().is_ok());
}
