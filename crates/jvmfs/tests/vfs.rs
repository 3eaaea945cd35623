//! End-to-end coverage of the node graph against a mock JVM, driven
//! through the same operations the kernel adapter issues.

use std::path::PathBuf;

use jvmfs::fs::{Node, NodeType, Vfs};
use jvmfs_jdwp::mock::{MockClass, MockJvm, MockJvmConfig, MockThread};
use jvmfs_jdwp::{EventKind, FieldInfo, JdwpClient, MethodInfo};

const MOUNT: &str = "/mnt";

fn jvm_config() -> MockJvmConfig {
    MockJvmConfig {
        threads: vec![
            MockThread {
                id: 100,
                name: "main".to_string(),
            },
            MockThread {
                id: 101,
                name: "worker-1".to_string(),
            },
        ],
        classes: vec![
            MockClass {
                type_id: 42,
                ref_type_tag: 1,
                signature: "Lcom/example/Main;".to_string(),
                methods: vec![
                    MethodInfo {
                        method_id: 7,
                        name: "main".to_string(),
                        signature: "([Ljava/lang/String;)V".to_string(),
                        mod_bits: 9,
                    },
                    MethodInfo {
                        method_id: 5,
                        name: "helper".to_string(),
                        signature: "()I".to_string(),
                        mod_bits: 2,
                    },
                ],
                fields: vec![FieldInfo {
                    field_id: 3,
                    name: "counter".to_string(),
                    signature: "I".to_string(),
                    mod_bits: 2,
                }],
            },
            MockClass {
                type_id: 43,
                ref_type_tag: 2,
                signature: "Lcom/example/Api;".to_string(),
                methods: vec![],
                fields: vec![],
            },
        ],
    }
}

async fn mount() -> (MockJvm, JdwpClient, Vfs) {
    let jvm = MockJvm::spawn_with_config(jvm_config()).await;
    let client = JdwpClient::connect(jvm.addr()).await.expect("connect");
    let vfs = Vfs::new(client.clone(), "localhost", 5005, PathBuf::from(MOUNT));
    (jvm, client, vfs)
}

async fn read_string(vfs: &Vfs, node: &Node) -> String {
    String::from_utf8(vfs.read(node, 0).await.expect("read")).expect("utf8")
}

fn entry_names(entries: &[jvmfs::fs::DirEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.name.as_str()).collect()
}

#[tokio::test]
async fn root_exposes_connection_details() {
    let (jvm, client, vfs) = mount().await;

    let entries = vfs.readdir(&Node::Root).await.unwrap();
    assert_eq!(
        entry_names(&entries),
        vec![
            "host",
            "port",
            "threads",
            "threads_by_name",
            "classes",
            "classes_by_signature",
            "events"
        ]
    );

    assert_eq!(read_string(&vfs, &Node::HostFile).await, "localhost");
    assert_eq!(read_string(&vfs, &Node::PortFile).await, "5005");

    assert_eq!(vfs.write(&Node::HostFile, b"x").await, Err(libc::EROFS));
    assert_eq!(
        vfs.lookup(&Node::Root, "nope").await,
        Err(libc::ENOENT)
    );

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn thread_suspension_round_trip() {
    let (jvm, client, vfs) = mount().await;

    let entries = vfs.readdir(&Node::ThreadsDir).await.unwrap();
    let names = entry_names(&entries);
    assert!(names.contains(&"100"));
    assert!(names.contains(&"101"));
    assert!(names.contains(&"control"));

    let thread = vfs.lookup(&Node::ThreadsDir, "100").await.unwrap();
    assert_eq!(thread, Node::ThreadDir { tid: 100 });
    let control = vfs.lookup(&thread, "control").await.unwrap();

    assert_eq!(read_string(&vfs, &control).await, "running");
    assert_eq!(
        read_string(&vfs, &Node::ThreadSuspendFile { tid: 100 }).await,
        "running"
    );
    assert_eq!(
        read_string(&vfs, &Node::ThreadStatusFile { tid: 100 }).await,
        "Running"
    );
    assert_eq!(
        read_string(&vfs, &Node::ThreadNameFile { tid: 100 }).await,
        "main"
    );

    vfs.write(&control, b"suspend\n").await.unwrap();
    assert_eq!(read_string(&vfs, &control).await, "suspended");
    assert_eq!(jvm.suspend_count(100).await, 1);

    // Writing the current state is a no-op, not a second suspension.
    vfs.write(&control, b"suspend").await.unwrap();
    assert_eq!(jvm.suspend_count(100).await, 1);

    vfs.write(&control, b"running\n").await.unwrap();
    assert_eq!(read_string(&vfs, &control).await, "running");
    assert_eq!(jvm.suspend_count(100).await, 0);

    // The numeric aliases: 0 suspends, 1 resumes.
    vfs.write(&control, b"0").await.unwrap();
    assert_eq!(jvm.suspend_count(100).await, 1);
    vfs.write(&control, b"1").await.unwrap();
    assert_eq!(jvm.suspend_count(100).await, 0);

    assert_eq!(vfs.write(&control, b"maybe").await, Err(libc::EBADMSG));

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn all_threads_control_suspends_the_vm() {
    let (jvm, client, vfs) = mount().await;

    let control = vfs.lookup(&Node::ThreadsDir, "control").await.unwrap();
    assert_eq!(control, Node::AllThreadsControl);
    assert_eq!(read_string(&vfs, &control).await, "");

    vfs.write(&control, b"suspend").await.unwrap();
    assert_eq!(jvm.suspend_count(100).await, 1);
    assert_eq!(jvm.suspend_count(101).await, 1);

    vfs.write(&control, b"running").await.unwrap();
    assert_eq!(jvm.suspend_count(100).await, 0);

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn threads_by_name_mirrors_threads() {
    let (jvm, client, vfs) = mount().await;

    let by_name = vfs.readdir(&Node::ThreadsByNameDir).await.unwrap();
    let by_id = vfs.readdir(&Node::ThreadsDir).await.unwrap();
    // One link per thread; the id listing carries one extra entry for the
    // control file.
    assert_eq!(by_name.len() + 1, by_id.len());
    assert!(by_name
        .iter()
        .all(|entry| entry.node_type == NodeType::Symlink));

    let link = vfs
        .lookup(&Node::ThreadsByNameDir, "worker-1")
        .await
        .unwrap();
    assert_eq!(
        vfs.readlink(&link).await.unwrap(),
        format!("{MOUNT}/threads/101")
    );

    assert_eq!(
        vfs.lookup(&Node::ThreadsByNameDir, "missing").await,
        Err(libc::ENOENT)
    );

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn class_metadata_projection() {
    let (jvm, client, vfs) = mount().await;

    let entries = vfs.readdir(&Node::ClassesDir).await.unwrap();
    assert_eq!(entry_names(&entries), vec!["42", "43"]);

    let class = vfs.lookup(&Node::ClassesDir, "42").await.unwrap();
    assert_eq!(class, Node::ClassDir { cid: 42 });
    assert_eq!(vfs.lookup(&Node::ClassesDir, "9999").await, Err(libc::ENOENT));
    assert_eq!(
        vfs.lookup(&Node::ClassesDir, "not-a-number").await,
        Err(libc::ENOENT)
    );

    // Tab-separated, sorted by id ascending.
    let method_info = read_string(&vfs, &Node::MethodInfoFile { cid: 42 }).await;
    assert_eq!(
        method_info,
        "5\thelper\t()I\n7\tmain\t([Ljava/lang/String;)V\n"
    );
    let field_info = read_string(&vfs, &Node::FieldInfoFile { cid: 42 }).await;
    assert_eq!(field_info, "3\tcounter\tI\n");

    let methods = vfs.readdir(&Node::MethodsDir { cid: 42 }).await.unwrap();
    assert_eq!(entry_names(&methods), vec!["7", "5"]);

    let method = vfs
        .lookup(&Node::MethodsDir { cid: 42 }, "7")
        .await
        .unwrap();
    let name_file = vfs.lookup(&method, "name").await.unwrap();
    assert_eq!(read_string(&vfs, &name_file).await, "main");
    let modifiers_file = vfs.lookup(&method, "modifiers").await.unwrap();
    assert_eq!(read_string(&vfs, &modifiers_file).await, "9");

    let field = vfs.lookup(&Node::FieldsDir { cid: 42 }, "3").await.unwrap();
    let signature_file = vfs.lookup(&field, "signature").await.unwrap();
    assert_eq!(read_string(&vfs, &signature_file).await, "I");

    assert_eq!(
        vfs.lookup(&Node::MethodsDir { cid: 42 }, "99").await,
        Err(libc::ENOENT)
    );

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn classes_by_signature_links() {
    let (jvm, client, vfs) = mount().await;

    let entries = vfs.readdir(&Node::ClassesBySignatureDir).await.unwrap();
    assert_eq!(
        entry_names(&entries),
        vec!["Lcom%2Fexample%2FMain%3B", "Lcom%2Fexample%2FApi%3B"]
    );

    let link = vfs
        .lookup(&Node::ClassesBySignatureDir, "Lcom%2Fexample%2FMain%3B")
        .await
        .unwrap();
    assert_eq!(
        link,
        Node::ClassLink {
            signature: "Lcom/example/Main;".to_string()
        }
    );
    assert_eq!(
        vfs.readlink(&link).await.unwrap(),
        format!("{MOUNT}/classes/42")
    );

    assert_eq!(
        vfs.lookup(&Node::ClassesBySignatureDir, "Lcom%2Fexample%2FGone%3B")
            .await,
        Err(libc::ENOENT)
    );

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn event_directory_lifecycle() {
    let (jvm, client, vfs) = mount().await;

    assert!(vfs.readdir(&Node::EventsDir).await.unwrap().is_empty());

    let event = vfs.mkdir(&Node::EventsDir, "watch1").await.unwrap();
    assert_eq!(
        event,
        Node::EventDir {
            event: "watch1".to_string()
        }
    );
    assert_eq!(
        vfs.mkdir(&Node::EventsDir, "watch1").await,
        Err(libc::EEXIST)
    );

    let children = vfs.readdir(&event).await.unwrap();
    assert_eq!(
        entry_names(&children),
        vec!["control", "kind", "suspendPolicy", "location", "hooks"]
    );

    let control = vfs.lookup(&event, "control").await.unwrap();
    assert_eq!(read_string(&vfs, &control).await, "idle");

    // Defaults per creation.
    let kind = vfs.lookup(&event, "kind").await.unwrap();
    assert_eq!(read_string(&vfs, &kind).await, "VMDeath");
    let policy = vfs.lookup(&event, "suspendPolicy").await.unwrap();
    assert_eq!(read_string(&vfs, &policy).await, "SuspendNone");

    // mkdir anywhere else is refused.
    assert_eq!(
        vfs.mkdir(&Node::ClassesDir, "44").await,
        Err(libc::EROFS)
    );

    vfs.rmdir(&Node::EventsDir, "watch1").await.unwrap();
    assert_eq!(vfs.lookup(&Node::EventsDir, "watch1").await, Err(libc::ENOENT));
    // Nodes held from before the removal degrade into lookup misses.
    assert_eq!(vfs.readdir(&event).await, Err(libc::ENOENT));
    assert_eq!(vfs.read(&control, 0).await, Err(libc::ENOENT));
    assert_eq!(vfs.rmdir(&Node::EventsDir, "watch1").await, Err(libc::ENOENT));

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn event_kind_and_policy_files() {
    let (jvm, client, vfs) = mount().await;

    let event = vfs.mkdir(&Node::EventsDir, "watch1").await.unwrap();
    let kind = vfs.lookup(&event, "kind").await.unwrap();
    let policy = vfs.lookup(&event, "suspendPolicy").await.unwrap();

    vfs.write(&kind, b"MethodEntry\n").await.unwrap();
    assert_eq!(read_string(&vfs, &kind).await, "MethodEntry");

    vfs.write(&policy, b"SuspendAll").await.unwrap();
    assert_eq!(read_string(&vfs, &policy).await, "SuspendAll");

    // Every symbolic kind name round-trips.
    for name in EventKind::ALL.map(EventKind::as_str) {
        vfs.write(&kind, name.as_bytes()).await.unwrap();
        assert_eq!(read_string(&vfs, &kind).await, name);
    }

    // A rejected write leaves the previous value observable.
    assert_eq!(vfs.write(&kind, b"xyz").await, Err(libc::EAFNOSUPPORT));
    assert_eq!(read_string(&vfs, &kind).await, "VMDeath");
    assert_eq!(
        vfs.write(&policy, b"SuspendSome").await,
        Err(libc::EAFNOSUPPORT)
    );
    assert_eq!(read_string(&vfs, &policy).await, "SuspendAll");

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn location_symlinks_bind_modifiers() {
    let (jvm, client, vfs) = mount().await;

    let event = vfs.mkdir(&Node::EventsDir, "watch1").await.unwrap();
    let location = vfs.lookup(&event, "location").await.unwrap();

    assert!(vfs.readdir(&location).await.unwrap().is_empty());

    let target = format!("{MOUNT}/classes/42/methods/7");
    let link = vfs.symlink(&location, "m0", &target).await.unwrap();
    assert_eq!(entry_names(&vfs.readdir(&location).await.unwrap()), vec!["m0"]);
    assert_eq!(vfs.readlink(&link).await.unwrap(), target);

    let field_target = format!("{MOUNT}/classes/42/fields/3");
    vfs.symlink(&location, "f0", &field_target).await.unwrap();

    // The modifier map and the surviving links stay in step.
    let snapshot = vfs
        .event_manager()
        .get("watch1")
        .await
        .unwrap()
        .snapshot()
        .await;
    assert_eq!(snapshot.modifiers.len(), 2);
    assert_eq!(
        vfs.readdir(&location).await.unwrap().len(),
        snapshot.modifiers.len()
    );

    vfs.unlink(&location, "f0").await.unwrap();
    let snapshot = vfs
        .event_manager()
        .get("watch1")
        .await
        .unwrap()
        .snapshot()
        .await;
    assert_eq!(snapshot.modifiers.len(), 1);
    assert_eq!(vfs.unlink(&location, "f0").await, Err(libc::ENOENT));
    assert_eq!(vfs.lookup(&location, "f0").await, Err(libc::ENOENT));

    // Rejected targets, each with its distinct failure.
    assert_eq!(
        vfs.symlink(&location, "bad", "classes/42/methods/7").await,
        Err(libc::EBADE)
    );
    assert_eq!(
        vfs.symlink(&location, "bad", "/elsewhere/classes/42/methods/7")
            .await,
        Err(libc::EBADE)
    );
    assert_eq!(
        vfs.symlink(&location, "bad", &format!("{MOUNT}/threads/100"))
            .await,
        Err(libc::EBADE)
    );
    assert_eq!(
        vfs.symlink(&location, "bad", &format!("{MOUNT}/classes/42/methods/99"))
            .await,
        Err(libc::ENOENT)
    );
    assert_eq!(
        vfs.symlink(&location, "bad", &format!("{MOUNT}/classes/77/methods/7"))
            .await,
        Err(libc::ENOENT)
    );
    assert!(vfs.readdir(&location).await.unwrap().len() == 1);

    // Symlinks are only meaningful under location/ and hooks/.
    assert_eq!(
        vfs.symlink(&Node::ThreadsDir, "t", &target).await,
        Err(libc::EROFS)
    );

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn hook_symlinks_and_activation() {
    let (jvm, client, vfs) = mount().await;

    let event = vfs.mkdir(&Node::EventsDir, "watch1").await.unwrap();
    let hooks = vfs.lookup(&event, "hooks").await.unwrap();
    let control = vfs.lookup(&event, "control").await.unwrap();

    let link = vfs
        .symlink(&hooks, "h0", "/tmp/myhook.so")
        .await
        .unwrap();
    assert_eq!(vfs.readlink(&link).await.unwrap(), "/tmp/myhook.so");
    assert_eq!(entry_names(&vfs.readdir(&hooks).await.unwrap()), vec!["h0"]);
    // Hook names are unique within an event.
    assert_eq!(
        vfs.symlink(&hooks, "h0", "/tmp/other.so").await,
        Err(libc::EEXIST)
    );

    // The reference is only validated at activation; a dangling hook
    // aborts the run and the event stays idle.
    assert_eq!(vfs.write(&control, b"1").await, Err(libc::EBADE));
    assert_eq!(read_string(&vfs, &control).await, "idle");

    vfs.unlink(&hooks, "h0").await.unwrap();
    assert_eq!(vfs.unlink(&hooks, "h0").await, Err(libc::ENOENT));

    // With no hooks the activation succeeds against the mock JVM.
    vfs.write(&control, b"1").await.unwrap();
    assert_eq!(read_string(&vfs, &control).await, "running");
    let request_id = jvm.wait_for_request(EventKind::VmDeath).await;

    // Already running / already idle are state errors.
    assert_eq!(vfs.write(&control, b"run").await, Err(libc::ENAVAIL));
    // An active event cannot be removed.
    assert_eq!(vfs.rmdir(&Node::EventsDir, "watch1").await, Err(libc::EBUSY));

    vfs.write(&control, b"0").await.unwrap();
    assert_eq!(read_string(&vfs, &control).await, "idle");
    assert!(jvm.cleared_requests().await.contains(&request_id));
    assert_eq!(vfs.write(&control, b"cancel").await, Err(libc::ENAVAIL));

    assert_eq!(vfs.write(&control, b"bogus").await, Err(libc::EBADMSG));

    vfs.rmdir(&Node::EventsDir, "watch1").await.unwrap();

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn control_file_open_and_truncate_rules() {
    let (jvm, client, vfs) = mount().await;

    let control = Node::ThreadControl { tid: 100 };
    vfs.open(&control, libc::O_RDWR).await.unwrap();
    assert_eq!(
        vfs.open(&control, libc::O_WRONLY | libc::O_APPEND).await,
        Err(libc::EBADR)
    );
    assert_eq!(
        vfs.open(&control, libc::O_RDWR | libc::O_EXCL).await,
        Err(libc::EBADR)
    );

    // `echo` style zero-size truncation is tolerated, real truncation is
    // not designed.
    vfs.setattr_size(&control, 0).await.unwrap();
    assert_eq!(vfs.setattr_size(&control, 5).await, Err(libc::EBADR));
    assert_eq!(vfs.setattr_size(&Node::HostFile, 0).await, Err(libc::EROFS));

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn read_offsets_slice_generated_content() {
    let (jvm, client, vfs) = mount().await;

    let content = vfs.read(&Node::HostFile, 0).await.unwrap();
    assert_eq!(content, b"localhost");
    assert_eq!(vfs.read(&Node::HostFile, 4).await.unwrap(), b"lhost");
    // Reading exactly at the end is EOF, past the end is an error.
    assert_eq!(vfs.read(&Node::HostFile, 9).await.unwrap(), b"");
    assert_eq!(vfs.read(&Node::HostFile, 10).await, Err(libc::EBADR));

    client.shutdown();
    jvm.shutdown();
}

#[tokio::test]
async fn transport_loss_surfaces_as_errno() {
    let (jvm, client, vfs) = mount().await;

    jvm.shutdown();
    client.shutdown();
    // Allow the read loop to observe the closed socket.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(
        vfs.readdir(&Node::ThreadsDir).await,
        Err(libc::EADDRNOTAVAIL)
    );
    assert_eq!(
        vfs.read(&Node::ThreadNameFile { tid: 100 }, 0).await,
        Err(libc::EBADF)
    );
}
