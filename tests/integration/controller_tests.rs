//! Integration tests for the distributed controller
//!
//! A real controller is served on an ephemeral port and driven through
//! the same client the distributed workers use.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::controller::{serve, ControllerClient, ControllerState};
use sumi_harvest::partition::{RangeAssignment, RangeDirection, RangePartitioner};
use sumi_harvest::rotation::{
    ExitNetwork, IpAuthority, IpChanger, IpRotator, Retention, RotationError,
};
use sumi_harvest::storage::{share, HybridStorage, Record, SqliteStorage, Storage};
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const REAL_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

struct RunningController {
    addr: SocketAddr,
    db_path: PathBuf,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<sumi_harvest::Result<()>>,
    _dir: TempDir,
}

impl RunningController {
    fn client(&self) -> ControllerClient {
        ControllerClient::new(&format!("http://{}", self.addr), Duration::from_secs(5)).unwrap()
    }

    async fn stop(self) -> (PathBuf, TempDir) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap().expect("Controller failed");
        (self.db_path, self._dir)
    }
}

async fn start_controller(lists_count: u64, scrapers: u64) -> RunningController {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("controller.db");

    let partitioner = RangePartitioner::new(lists_count, scrapers, RangeDirection::Descending).unwrap();
    let authority = Arc::new(IpAuthority::new(REAL_ADDRESS, Retention::RetainAll));
    let storage = share(SqliteStorage::new(&db_path, 100).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let state = ControllerState::new(partitioner, authority, storage);
    let handle = tokio::spawn(serve(listener, state, async move {
        let _ = shutdown_rx.await;
    }));

    RunningController {
        addr,
        db_path,
        shutdown,
        handle,
        _dir: dir,
    }
}

/// Exit network replaying the same address sequence for every worker
struct ReplayNetwork {
    addresses: Vec<IpAddr>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl ReplayNetwork {
    fn new(addresses: Vec<IpAddr>) -> Self {
        Self {
            addresses,
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExitNetwork for ReplayNetwork {
    async fn renew_exit_circuit(&self) -> Result<(), RotationError> {
        self.cursor.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn current_exit_address(&self) -> Result<IpAddr, RotationError> {
        let cursor = self.cursor.load(std::sync::atomic::Ordering::SeqCst);
        Ok(self.addresses[(cursor - 1) % self.addresses.len()])
    }
}

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

#[tokio::test]
async fn test_health_and_range_hand_out() {
    let controller = start_controller(110, 10).await;
    let client = controller.client();

    client.health().await.expect("Controller not healthy");

    let mut ranges = Vec::new();
    for _ in 0..10 {
        ranges.push(client.list_range().await.unwrap());
    }

    assert_eq!(ranges[0], RangeAssignment::new(110, 99));
    assert_eq!(ranges[9], RangeAssignment::new(11, 0));

    // Every index handed out exactly once
    let mut indices: Vec<u64> = ranges.iter().flat_map(|r| r.indices()).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..110).collect::<Vec<_>>());

    assert_eq!(client.list_range().await.unwrap(), RangeAssignment::EMPTY);

    controller.stop().await;
}

#[tokio::test]
async fn test_ip_safety_is_shared_between_workers() {
    let controller = start_controller(10, 2).await;
    let client = controller.client();

    assert!(client.ip_is_safe(ip(1)).await.unwrap());
    assert!(!client.ip_is_safe(ip(1)).await.unwrap());
    assert!(!client.ip_is_safe(REAL_ADDRESS).await.unwrap());

    // Two workers seeing the same exit sequence never share an address
    let sequence = vec![ip(1), ip(2), ip(3), ip(4)];
    let first = IpChanger::new(ReplayNetwork::new(sequence.clone()), controller.client(), 4, Duration::ZERO);
    let second = IpChanger::new(ReplayNetwork::new(sequence), controller.client(), 4, Duration::ZERO);

    let a = first.get_new_ip().await.unwrap();
    let b = second.get_new_ip().await.unwrap();

    assert_eq!(a, ip(2));
    assert_eq!(b, ip(3));

    controller.stop().await;
}

#[tokio::test]
async fn test_unreachable_controller_is_fatal() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ControllerClient::new(&format!("http://{}", addr), Duration::from_secs(1)).unwrap();
    let changer = IpChanger::new(ReplayNetwork::new(vec![ip(1)]), client, 3, Duration::ZERO);

    let error = changer.get_new_ip().await.unwrap_err();

    assert!(matches!(error, RotationError::AuthorityUnavailable(_)));
    assert!(error.is_fatal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_records_land_in_controller_store() {
    let controller = start_controller(10, 2).await;
    let client = controller.client();

    let worker_dir = TempDir::new().unwrap();
    let local = SqliteStorage::new(&worker_dir.path().join("worker.db"), 100).unwrap();
    let runtime = Handle::current();

    // Remote calls block, so drive the hybrid store from a blocking thread
    let (records, pending) = tokio::task::spawn_blocking(move || {
        let mut storage = HybridStorage::new(local, client, runtime);

        storage
            .insert_item_urls(&["http://site/posts/1".to_string(), "http://site/posts/2".to_string()])
            .unwrap();
        storage
            .insert_record(&Record::new("http://site/posts/1").with("h1", "Post 1"))
            .unwrap();
        storage.delete_item_url("http://site/posts/1").unwrap();
        storage.commit().unwrap();

        (storage.count_records().unwrap(), storage.count_pending().unwrap())
    })
    .await
    .unwrap();

    // Records are not kept locally
    assert_eq!(records, 0);
    assert_eq!(pending, 1);

    let (db_path, _dir) = controller.stop().await;
    let controller_store = SqliteStorage::new(Path::new(&db_path), 100).unwrap();
    assert_eq!(controller_store.count_records().unwrap(), 1);
}
