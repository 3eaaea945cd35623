//! A tiny JDWP server used for unit and integration testing.
//!
//! It supports the slice of JDWP that jvmfs speaks: thread and class
//! enumeration, suspend/resume bookkeeping, and event request management.
//! Tests can inspect the event-request ledger and push composite event
//! packets to the connected client on demand.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{mpsc, Mutex},
};
use tokio_util::sync::CancellationToken;

use crate::codec::{encode_command, encode_reply, JdwpReader, JdwpWriter, FLAG_REPLY, HANDSHAKE, HEADER_LEN};
use crate::types::{EventKind, FieldInfo, JdwpIdSizes, Location, MethodInfo, ThreadId};

// JDWP error codes the mock hands out.
const ERROR_INVALID_THREAD: u16 = 10;
const ERROR_INVALID_CLASS: u16 = 21;
const ERROR_NOT_IMPLEMENTED: u16 = 99;

#[derive(Debug, Clone)]
pub struct MockThread {
    pub id: ThreadId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MockClass {
    pub type_id: u64,
    pub ref_type_tag: u8,
    pub signature: String,
    pub methods: Vec<MethodInfo>,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct MockJvmConfig {
    pub threads: Vec<MockThread>,
    pub classes: Vec<MockClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedRequest {
    pub request_id: i32,
    pub kind: u8,
    pub suspend_policy: u8,
    pub modifier_kinds_len: usize,
}

struct State {
    config: MockJvmConfig,
    // Per-thread and VM-wide suspend counts; a thread reads as suspended
    // when either is positive.
    thread_suspends: Mutex<Vec<(ThreadId, i32)>>,
    vm_suspends: AtomicI32,
    requests: Mutex<Vec<RecordedRequest>>,
    cleared: Mutex<Vec<i32>>,
    next_request_id: AtomicI32,
    events: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

pub struct MockJvm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<State>,
    event_tx: mpsc::UnboundedSender<Vec<u8>>,
    next_event_packet_id: AtomicI32,
}

impl MockJvm {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(MockJvmConfig::default()).await
    }

    pub async fn spawn_with_config(config: MockJvmConfig) -> Self {
        let listener = TcpListener::bind(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
        ))
        .await
        .expect("bind mock JVM listener");
        let addr = listener.local_addr().expect("mock JVM local addr");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let thread_suspends = config.threads.iter().map(|t| (t.id, 0)).collect();
        let state = Arc::new(State {
            config,
            thread_suspends: Mutex::new(thread_suspends),
            vm_suspends: AtomicI32::new(0),
            requests: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            next_request_id: AtomicI32::new(1),
            events: Mutex::new(Some(event_rx)),
        });

        let shutdown = CancellationToken::new();
        {
            let state = state.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        res = listener.accept() => res,
                    };
                    let Ok((stream, _peer)) = accepted else { break };
                    serve_connection(stream, state.clone(), shutdown.clone()).await;
                }
            });
        }

        Self {
            addr,
            shutdown,
            state,
            event_tx,
            next_event_packet_id: AtomicI32::new(0x4000_0000),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().await.clone()
    }

    pub async fn cleared_requests(&self) -> Vec<i32> {
        self.state.cleared.lock().await.clone()
    }

    /// Block until a request of `kind` has been registered, returning its id.
    pub async fn wait_for_request(&self, kind: EventKind) -> i32 {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            {
                let requests = self.state.requests.lock().await;
                if let Some(req) = requests.iter().find(|r| r.kind == kind.wire_value()) {
                    return req.request_id;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no {kind} request registered within 5s");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn suspend_count(&self, thread: ThreadId) -> i32 {
        let per_thread = {
            let suspends = self.state.thread_suspends.lock().await;
            suspends
                .iter()
                .find(|(id, _)| *id == thread)
                .map(|(_, count)| *count)
                .unwrap_or(0)
        };
        per_thread + self.state.vm_suspends.load(Ordering::SeqCst)
    }

    pub async fn emit_method_entry(&self, request_id: i32, thread: ThreadId) {
        let sizes = JdwpIdSizes::default();
        let mut w = JdwpWriter::new();
        w.write_u8(0);
        w.write_u32(1);
        w.write_u8(EventKind::MethodEntry.wire_value());
        w.write_i32(request_id);
        w.write_object_id(thread, &sizes);
        w.write_location(
            &Location {
                type_tag: 1,
                class_id: 42,
                method_id: 7,
                index: 0,
            },
            &sizes,
        );
        self.emit_raw(w.into_vec());
    }

    pub async fn emit_vm_death(&self, request_id: i32) {
        let mut w = JdwpWriter::new();
        w.write_u8(0);
        w.write_u32(1);
        w.write_u8(EventKind::VmDeath.wire_value());
        w.write_i32(request_id);
        self.emit_raw(w.into_vec());
    }

    fn emit_raw(&self, composite_payload: Vec<u8>) {
        let id = self.next_event_packet_id.fetch_add(1, Ordering::SeqCst);
        let packet = encode_command(id as u32, 64, 100, &composite_payload);
        let _ = self.event_tx.send(packet);
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<State>, shutdown: CancellationToken) {
    let mut handshake = [0u8; HANDSHAKE.len()];
    if stream.read_exact(&mut handshake).await.is_err() || handshake != *HANDSHAKE {
        return;
    }
    if stream.write_all(HANDSHAKE).await.is_err() {
        return;
    }

    let mut events = state.events.lock().await.take();

    loop {
        let mut header = [0u8; HEADER_LEN];
        tokio::select! {
            _ = shutdown.cancelled() => return,
            packet = async {
                match &mut events {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                let Some(packet) = packet else { return };
                if stream.write_all(&packet).await.is_err() {
                    return;
                }
            }
            read = stream.read_exact(&mut header) => {
                if read.is_err() {
                    return;
                }
                let length = u32::from_be_bytes(header[0..4].try_into().unwrap()) as usize;
                if length < HEADER_LEN || (header[8] & FLAG_REPLY) != 0 {
                    return;
                }
                let id = u32::from_be_bytes(header[4..8].try_into().unwrap());
                let command_set = header[9];
                let command = header[10];
                let mut payload = vec![0u8; length - HEADER_LEN];
                if stream.read_exact(&mut payload).await.is_err() {
                    return;
                }

                let reply = handle_command(&state, command_set, command, &payload).await;
                let packet = match reply {
                    Ok(body) => encode_reply(id, 0, &body),
                    Err(code) => encode_reply(id, code, &[]),
                };
                if stream.write_all(&packet).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn handle_command(
    state: &State,
    command_set: u8,
    command: u8,
    payload: &[u8],
) -> std::result::Result<Vec<u8>, u16> {
    let sizes = JdwpIdSizes::default();
    let mut r = JdwpReader::new(payload);
    let mut w = JdwpWriter::new();

    match (command_set, command) {
        // VirtualMachine.IDSizes
        (1, 7) => {
            for size in [
                sizes.field_id,
                sizes.method_id,
                sizes.object_id,
                sizes.reference_type_id,
                sizes.frame_id,
            ] {
                w.write_u32(size as u32);
            }
        }
        // VirtualMachine.AllThreads
        (1, 4) => {
            w.write_u32(state.config.threads.len() as u32);
            for thread in &state.config.threads {
                w.write_object_id(thread.id, &sizes);
            }
        }
        // VirtualMachine.AllClasses
        (1, 3) => {
            w.write_u32(state.config.classes.len() as u32);
            for class in &state.config.classes {
                w.write_u8(class.ref_type_tag);
                w.write_reference_type_id(class.type_id, &sizes);
                w.write_string(&class.signature);
                w.write_u32(7); // verified | prepared | initialized
            }
        }
        // VirtualMachine.Suspend / Resume
        (1, 8) => {
            state.vm_suspends.fetch_add(1, Ordering::SeqCst);
        }
        (1, 9) => {
            let _ = state
                .vm_suspends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                    Some((count - 1).max(0))
                });
        }
        // ReferenceType.Fields / Methods
        (2, 4) => {
            let class_id = r.read_reference_type_id(&sizes).map_err(|_| ERROR_INVALID_CLASS)?;
            let class = state
                .config
                .classes
                .iter()
                .find(|c| c.type_id == class_id)
                .ok_or(ERROR_INVALID_CLASS)?;
            w.write_u32(class.fields.len() as u32);
            for field in &class.fields {
                w.write_id(field.field_id, sizes.field_id);
                w.write_string(&field.name);
                w.write_string(&field.signature);
                w.write_u32(field.mod_bits);
            }
        }
        (2, 5) => {
            let class_id = r.read_reference_type_id(&sizes).map_err(|_| ERROR_INVALID_CLASS)?;
            let class = state
                .config
                .classes
                .iter()
                .find(|c| c.type_id == class_id)
                .ok_or(ERROR_INVALID_CLASS)?;
            w.write_u32(class.methods.len() as u32);
            for method in &class.methods {
                w.write_id(method.method_id, sizes.method_id);
                w.write_string(&method.name);
                w.write_string(&method.signature);
                w.write_u32(method.mod_bits);
            }
        }
        // ThreadReference.Name
        (11, 1) => {
            let thread_id = r.read_object_id(&sizes).map_err(|_| ERROR_INVALID_THREAD)?;
            let thread = state
                .config
                .threads
                .iter()
                .find(|t| t.id == thread_id)
                .ok_or(ERROR_INVALID_THREAD)?;
            w.write_string(&thread.name);
        }
        // ThreadReference.Suspend / Resume
        (11, 2) => {
            let thread_id = r.read_object_id(&sizes).map_err(|_| ERROR_INVALID_THREAD)?;
            let mut suspends = state.thread_suspends.lock().await;
            let entry = suspends
                .iter_mut()
                .find(|(id, _)| *id == thread_id)
                .ok_or(ERROR_INVALID_THREAD)?;
            entry.1 += 1;
        }
        (11, 3) => {
            let thread_id = r.read_object_id(&sizes).map_err(|_| ERROR_INVALID_THREAD)?;
            let mut suspends = state.thread_suspends.lock().await;
            let entry = suspends
                .iter_mut()
                .find(|(id, _)| *id == thread_id)
                .ok_or(ERROR_INVALID_THREAD)?;
            entry.1 = (entry.1 - 1).max(0);
        }
        // ThreadReference.Status
        (11, 4) => {
            let thread_id = r.read_object_id(&sizes).map_err(|_| ERROR_INVALID_THREAD)?;
            let suspends = state.thread_suspends.lock().await;
            let entry = suspends
                .iter()
                .find(|(id, _)| *id == thread_id)
                .ok_or(ERROR_INVALID_THREAD)?;
            let suspended = entry.1 + state.vm_suspends.load(Ordering::SeqCst) > 0;
            w.write_i32(1); // RUNNING
            w.write_i32(if suspended { 1 } else { 0 });
        }
        // EventRequest.Set
        (15, 1) => {
            let kind = r.read_u8().map_err(|_| ERROR_NOT_IMPLEMENTED)?;
            let suspend_policy = r.read_u8().map_err(|_| ERROR_NOT_IMPLEMENTED)?;
            let modifier_count = r.read_u32().map_err(|_| ERROR_NOT_IMPLEMENTED)? as usize;
            let mut modifier_kinds = Vec::with_capacity(modifier_count);
            for _ in 0..modifier_count {
                let mod_kind = r.read_u8().map_err(|_| ERROR_NOT_IMPLEMENTED)?;
                skip_modifier(&mut r, mod_kind, &sizes)?;
                modifier_kinds.push(mod_kind);
            }

            let request_id = state.next_request_id.fetch_add(1, Ordering::SeqCst);
            state.requests.lock().await.push(RecordedRequest {
                request_id,
                kind,
                suspend_policy,
                modifier_kinds_len: modifier_kinds.len(),
            });
            w.write_i32(request_id);
        }
        // EventRequest.Clear
        (15, 2) => {
            let _kind = r.read_u8().map_err(|_| ERROR_NOT_IMPLEMENTED)?;
            let request_id = r.read_i32().map_err(|_| ERROR_NOT_IMPLEMENTED)?;
            state.cleared.lock().await.push(request_id);
            let mut requests = state.requests.lock().await;
            requests.retain(|req| req.request_id != request_id);
        }
        _ => return Err(ERROR_NOT_IMPLEMENTED),
    }

    Ok(w.into_vec())
}

fn skip_modifier(
    r: &mut JdwpReader<'_>,
    mod_kind: u8,
    sizes: &JdwpIdSizes,
) -> std::result::Result<(), u16> {
    let consumed: crate::types::Result<()> = (|| {
        match mod_kind {
            1 => {
                r.read_u32()?;
            }
            3 | 11 => {
                r.read_object_id(sizes)?;
            }
            4 => {
                r.read_reference_type_id(sizes)?;
            }
            5 | 6 | 12 => {
                r.read_string()?;
            }
            7 => {
                r.read_location(sizes)?;
            }
            8 => {
                r.read_reference_type_id(sizes)?;
                r.read_bool()?;
                r.read_bool()?;
            }
            9 => {
                r.read_reference_type_id(sizes)?;
                r.read_id(sizes.field_id)?;
            }
            10 => {
                r.read_object_id(sizes)?;
                r.read_u32()?;
                r.read_u32()?;
            }
            _ => {
                return Err(crate::types::JdwpError::Protocol(format!(
                    "unsupported modifier kind {mod_kind}"
                )))
            }
        }
        Ok(())
    })();
    consumed.map_err(|_| ERROR_NOT_IMPLEMENTED)
}
