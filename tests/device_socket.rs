// Socket-level tests: attach/detach lifecycle and concurrent clients.
use std::path::Path;
use std::sync::Arc;

use intstack::api::{
    DeviceClient, ErrorKind, HotplugHandler, InterfaceController, Pop, SocketHost, StackStore,
    device_present,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

fn controller(path: &Path, runtime: &tokio::runtime::Runtime) -> InterfaceController<SocketHost> {
    let host = SocketHost::new(path, runtime.handle().clone());
    InterfaceController::new(Arc::new(StackStore::new()), host)
}

#[test]
fn socket_follows_attach_and_detach() {
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dev").join("int_stack");
    let controller = controller(&path, &runtime);

    assert!(!device_present(&path));
    let err = DeviceClient::open(&path).expect_err("not attached");
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    controller.on_attach().expect("attach");
    assert!(device_present(&path));
    assert!(controller.is_present());

    controller.on_detach();
    assert!(!device_present(&path));
    assert!(!controller.is_present());
    let err = DeviceClient::open(&path).expect_err("detached");
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}

#[test]
fn dropping_an_attached_controller_removes_the_socket() {
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("int_stack");
    let controller = controller(&path, &runtime);
    controller.on_attach().expect("attach");
    assert!(device_present(&path));

    drop(controller);
    assert!(!device_present(&path));
    let err = DeviceClient::open(&path).expect_err("dropped");
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}

#[test]
fn push_pop_resize_over_the_socket() {
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("int_stack");
    let controller = controller(&path, &runtime);
    controller.on_attach().expect("attach");

    let mut client = DeviceClient::open(&path).expect("open");
    let err = client.push(1).expect_err("unsized");
    assert_eq!(err.kind(), ErrorKind::Full);

    client.set_size(2).expect("set size");
    client.push(1).expect("push 1");
    client.push(2).expect("push 2");
    let err = client.push(3).expect_err("full");
    assert_eq!(err.kind(), ErrorKind::Full);

    assert_eq!(client.pop().expect("pop"), Pop::Value(2));
    assert_eq!(client.pop().expect("pop"), Pop::Value(1));
    assert_eq!(client.pop().expect("pop"), Pop::Empty);

    for size in [0, -1] {
        let err = client.set_size(size).expect_err("bad size");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(controller.store().capacity(), 2);

    let err = client.control(0x1234, &4i32.to_ne_bytes()).expect_err("opcode");
    assert_eq!(err.kind(), ErrorKind::NotSupported);
    let err = client.read(8).expect_err("read size");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = client.write(&[1, 2]).expect_err("write size");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    client.push(-7).expect("push negative");
    assert_eq!(client.unwind().expect("unwind"), vec![-7]);
    controller.on_detach();
}

#[test]
fn contents_survive_detach_reattach() {
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("int_stack");
    let controller = controller(&path, &runtime);
    controller.on_attach().expect("attach");

    {
        let mut client = DeviceClient::open(&path).expect("open");
        client.set_size(4).expect("set size");
        for value in [10, 20, 30] {
            client.push(value).expect("push");
        }
    }
    let before = controller.store().snapshot();

    controller.on_detach();
    controller.on_attach().expect("reattach");
    controller.on_attach().expect("double attach is a no-op");
    assert_eq!(controller.store().snapshot(), before);

    let mut client = DeviceClient::open(&path).expect("reopen");
    assert_eq!(client.unwind().expect("unwind"), vec![30, 20, 10]);
    controller.on_detach();
}

#[test]
fn concurrent_clients_fill_every_slot_once() {
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("int_stack");
    let controller = controller(&path, &runtime);
    controller.on_attach().expect("attach");

    let workers = 16;
    let per_worker = 8;
    DeviceClient::open(&path)
        .expect("open")
        .set_size(workers * per_worker)
        .expect("set size");

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let path = path.clone();
            scope.spawn(move || {
                let mut client = DeviceClient::open(&path).expect("open");
                for i in 0..per_worker {
                    client.push(worker * per_worker + i).expect("push");
                }
            });
        }
    });

    let mut client = DeviceClient::open(&path).expect("open");
    let err = client.push(-1).expect_err("full");
    assert_eq!(err.kind(), ErrorKind::Full);

    let mut values = client.unwind().expect("unwind");
    values.sort_unstable();
    assert_eq!(values, (0..workers * per_worker).collect::<Vec<_>>());
    controller.on_detach();
}
