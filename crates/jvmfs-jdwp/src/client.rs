use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{broadcast, oneshot, Mutex},
};
use tokio_util::sync::CancellationToken;

use crate::codec::{encode_command, JdwpReader, JdwpWriter, FLAG_REPLY, HANDSHAKE, HEADER_LEN};
use crate::types::{
    ClassInfo, EventKind, FieldId, FieldInfo, JdwpError, JdwpEvent, JdwpIdSizes, Location,
    MethodInfo, ReferenceTypeId, Result, SuspendPolicy, SuspendStatus, ThreadId, ThreadStatus,
};

#[derive(Debug, Clone)]
pub struct JdwpClientConfig {
    pub handshake_timeout: Duration,
    pub reply_timeout: Duration,
    pub event_channel_size: usize,
}

impl Default for JdwpClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
            event_channel_size: 64,
        }
    }
}

#[derive(Debug)]
struct Reply {
    error_code: u16,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    pending: Mutex<HashMap<u32, oneshot::Sender<std::result::Result<Reply, JdwpError>>>>,
    next_id: AtomicU32,
    id_sizes: Mutex<JdwpIdSizes>,
    events: broadcast::Sender<JdwpEvent>,
    shutdown: CancellationToken,
    config: JdwpClientConfig,
}

/// Handle to one JDWP connection. Cheap to clone; all clones share the
/// underlying stream and read loop.
#[derive(Clone)]
pub struct JdwpClient {
    inner: Arc<Inner>,
}

impl JdwpClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, JdwpClientConfig::default()).await
    }

    pub async fn connect_with_config(addr: SocketAddr, config: JdwpClientConfig) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);

        tokio::time::timeout(config.handshake_timeout, stream.write_all(HANDSHAKE))
            .await
            .map_err(|_| JdwpError::Timeout)??;

        let mut handshake = [0u8; HANDSHAKE.len()];
        tokio::time::timeout(config.handshake_timeout, stream.read_exact(&mut handshake))
            .await
            .map_err(|_| JdwpError::Timeout)??;

        if handshake != *HANDSHAKE {
            return Err(JdwpError::Protocol(format!(
                "invalid handshake reply: {:?}",
                String::from_utf8_lossy(&handshake)
            )));
        }

        let (reader, writer) = stream.into_split();
        let (events, _) = broadcast::channel(config.event_channel_size);

        let inner = Arc::new(Inner {
            writer: Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            id_sizes: Mutex::new(JdwpIdSizes::default()),
            events,
            shutdown: CancellationToken::new(),
            config,
        });

        tokio::spawn(read_loop(reader, inner.clone()));

        let client = Self { inner };
        // ID sizes are required for correct parsing of every later reply and event.
        let _ = client.idsizes().await?;

        Ok(client)
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// A token that is cancelled when the client is shut down, either
    /// explicitly via [`JdwpClient::shutdown`] or implicitly when the
    /// underlying TCP connection closes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<JdwpEvent> {
        self.inner.events.subscribe()
    }

    async fn send_command_raw(
        &self,
        command_set: u8,
        command: u8,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id, tx);
        }

        let packet = encode_command(id, command_set, command, &payload);
        {
            let mut writer = self.inner.writer.lock().await;
            writer.write_all(&packet).await?;
        }

        let reply = tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                self.remove_pending(id).await;
                return Err(JdwpError::Cancelled);
            }
            res = tokio::time::timeout(self.inner.config.reply_timeout, rx) => {
                match res {
                    Ok(Ok(r)) => r,
                    Ok(Err(_closed)) => return Err(JdwpError::ConnectionClosed),
                    Err(_elapsed) => {
                        self.remove_pending(id).await;
                        return Err(JdwpError::Timeout);
                    }
                }
            }
        }?;

        if reply.error_code != 0 {
            return Err(JdwpError::VmError(reply.error_code));
        }

        Ok(reply.payload)
    }

    async fn remove_pending(&self, id: u32) {
        let mut pending = self.inner.pending.lock().await;
        pending.remove(&id);
    }

    async fn id_sizes(&self) -> JdwpIdSizes {
        *self.inner.id_sizes.lock().await
    }

    /// VirtualMachine.IDSizes (1, 7)
    pub async fn idsizes(&self) -> Result<JdwpIdSizes> {
        let payload = self.send_command_raw(1, 7, Vec::new()).await?;
        let mut r = JdwpReader::new(&payload);
        let sizes = JdwpIdSizes {
            field_id: r.read_u32()? as usize,
            method_id: r.read_u32()? as usize,
            object_id: r.read_u32()? as usize,
            reference_type_id: r.read_u32()? as usize,
            frame_id: r.read_u32()? as usize,
        };
        *self.inner.id_sizes.lock().await = sizes;
        Ok(sizes)
    }

    /// VirtualMachine.AllThreads (1, 4)
    pub async fn all_threads(&self) -> Result<Vec<ThreadId>> {
        let payload = self.send_command_raw(1, 4, Vec::new()).await?;
        let sizes = self.id_sizes().await;
        let mut r = JdwpReader::new(&payload);
        let count = r.read_u32()? as usize;
        let mut threads = Vec::with_capacity(count);
        for _ in 0..count {
            threads.push(r.read_object_id(&sizes)?);
        }
        Ok(threads)
    }

    /// ThreadReference.Name (11, 1)
    pub async fn thread_name(&self, thread: ThreadId) -> Result<String> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_object_id(thread, &sizes);
        let payload = self.send_command_raw(11, 1, w.into_vec()).await?;
        let mut r = JdwpReader::new(&payload);
        r.read_string()
    }

    /// ThreadReference.Status (11, 4)
    pub async fn thread_status(&self, thread: ThreadId) -> Result<(ThreadStatus, SuspendStatus)> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_object_id(thread, &sizes);
        let payload = self.send_command_raw(11, 4, w.into_vec()).await?;
        let mut r = JdwpReader::new(&payload);
        let thread_status = ThreadStatus(r.read_i32()?);
        let suspend_status = SuspendStatus(r.read_i32()?);
        Ok((thread_status, suspend_status))
    }

    /// ThreadReference.Suspend (11, 2)
    pub async fn suspend_thread(&self, thread: ThreadId) -> Result<()> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_object_id(thread, &sizes);
        let _ = self.send_command_raw(11, 2, w.into_vec()).await?;
        Ok(())
    }

    /// ThreadReference.Resume (11, 3)
    pub async fn resume_thread(&self, thread: ThreadId) -> Result<()> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_object_id(thread, &sizes);
        let _ = self.send_command_raw(11, 3, w.into_vec()).await?;
        Ok(())
    }

    /// VirtualMachine.Suspend (1, 8)
    pub async fn suspend_all(&self) -> Result<()> {
        let _ = self.send_command_raw(1, 8, Vec::new()).await?;
        Ok(())
    }

    /// VirtualMachine.Resume (1, 9)
    pub async fn resume_all(&self) -> Result<()> {
        let _ = self.send_command_raw(1, 9, Vec::new()).await?;
        Ok(())
    }

    /// VirtualMachine.AllClasses (1, 3)
    pub async fn all_classes(&self) -> Result<Vec<ClassInfo>> {
        let payload = self.send_command_raw(1, 3, Vec::new()).await?;
        let sizes = self.id_sizes().await;
        let mut r = JdwpReader::new(&payload);
        let count = r.read_u32()? as usize;
        let mut classes = Vec::with_capacity(count);
        for _ in 0..count {
            classes.push(ClassInfo {
                ref_type_tag: r.read_u8()?,
                type_id: r.read_reference_type_id(&sizes)?,
                signature: r.read_string()?,
                status: r.read_u32()?,
            });
        }
        Ok(classes)
    }

    /// ReferenceType.Methods (2, 5)
    pub async fn methods(&self, class_id: ReferenceTypeId) -> Result<Vec<MethodInfo>> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_reference_type_id(class_id, &sizes);
        let payload = self.send_command_raw(2, 5, w.into_vec()).await?;
        let mut r = JdwpReader::new(&payload);
        let count = r.read_u32()? as usize;
        let mut methods = Vec::with_capacity(count);
        for _ in 0..count {
            methods.push(MethodInfo {
                method_id: r.read_id(sizes.method_id)?,
                name: r.read_string()?,
                signature: r.read_string()?,
                mod_bits: r.read_u32()?,
            });
        }
        Ok(methods)
    }

    /// ReferenceType.Fields (2, 4)
    pub async fn fields(&self, class_id: ReferenceTypeId) -> Result<Vec<FieldInfo>> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_reference_type_id(class_id, &sizes);
        let payload = self.send_command_raw(2, 4, w.into_vec()).await?;
        let mut r = JdwpReader::new(&payload);
        let count = r.read_u32()? as usize;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            fields.push(FieldInfo {
                field_id: r.read_id(sizes.field_id)?,
                name: r.read_string()?,
                signature: r.read_string()?,
                mod_bits: r.read_u32()?,
            });
        }
        Ok(fields)
    }

    /// EventRequest.Set (15, 1)
    pub async fn event_request_set(
        &self,
        kind: EventKind,
        suspend_policy: SuspendPolicy,
        modifiers: Vec<EventModifier>,
    ) -> Result<i32> {
        let sizes = self.id_sizes().await;
        let mut w = JdwpWriter::new();
        w.write_u8(kind.wire_value());
        w.write_u8(suspend_policy.wire_value());
        w.write_u32(modifiers.len() as u32);
        for modifier in modifiers {
            modifier.encode(&mut w, &sizes);
        }
        let payload = self.send_command_raw(15, 1, w.into_vec()).await?;
        let mut r = JdwpReader::new(&payload);
        r.read_i32()
    }

    /// EventRequest.Clear (15, 2)
    pub async fn event_request_clear(&self, kind: EventKind, request_id: i32) -> Result<()> {
        let mut w = JdwpWriter::new();
        w.write_u8(kind.wire_value());
        w.write_i32(request_id);
        let _ = self.send_command_raw(15, 2, w.into_vec()).await?;
        Ok(())
    }

    /// Subscribe to events of `kind` and deliver each matching one to
    /// `on_event` until `cancel` fires or the connection drops.
    ///
    /// The server-side request is registered before this method starts
    /// waiting and cleared (best effort) after cancellation. Events are
    /// matched by request id; VM death is additionally forwarded to
    /// `VMDeath` watchers because the JVM emits the automatic one with
    /// request id 0.
    pub async fn watch_events<F>(
        &self,
        cancel: CancellationToken,
        kind: EventKind,
        suspend_policy: SuspendPolicy,
        modifiers: Vec<EventModifier>,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(&JdwpEvent) + Send,
    {
        // Subscribe before registering so no delivery can slip between the two.
        let mut events = self.subscribe_events();
        let request_id = self.event_request_set(kind, suspend_policy, modifiers).await?;

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = self.inner.shutdown.cancelled() => break Err(JdwpError::ConnectionClosed),
                event = events.recv() => match event {
                    Ok(event) => {
                        let matches = event.request_id() == request_id
                            || (kind == EventKind::VmDeath
                                && matches!(event, JdwpEvent::VmDeath { .. }));
                        if matches {
                            on_event(&event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "jvmfs.jdwp",
                            skipped,
                            "event subscriber lagged, deliveries dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break Err(JdwpError::ConnectionClosed);
                    }
                },
            }
        };

        if outcome.is_ok() {
            if let Err(err) = self.event_request_clear(kind, request_id).await {
                tracing::debug!(
                    target: "jvmfs.jdwp",
                    request_id,
                    error = %err,
                    "failed to clear event request after cancellation"
                );
            }
        }

        outcome
    }
}

/// Wire-level event request modifiers (JDWP `EventRequest.Set` `modKind`s).
#[derive(Debug, Clone, PartialEq)]
pub enum EventModifier {
    Count {
        count: u32,
    },
    ThreadOnly {
        thread: ThreadId,
    },
    ClassMatch {
        pattern: String,
    },
    LocationOnly {
        location: Location,
    },
    ExceptionOnly {
        exception_or_null: ReferenceTypeId,
        caught: bool,
        uncaught: bool,
    },
    FieldOnly {
        declaring: ReferenceTypeId,
        field: FieldId,
    },
    Step {
        thread: ThreadId,
        size: u32,
        depth: u32,
    },
}

impl EventModifier {
    fn encode(self, w: &mut JdwpWriter, sizes: &JdwpIdSizes) {
        match self {
            EventModifier::Count { count } => {
                w.write_u8(1);
                w.write_u32(count);
            }
            EventModifier::ThreadOnly { thread } => {
                w.write_u8(3);
                w.write_object_id(thread, sizes);
            }
            EventModifier::ClassMatch { pattern } => {
                w.write_u8(5);
                w.write_string(&pattern);
            }
            EventModifier::LocationOnly { location } => {
                w.write_u8(7);
                w.write_location(&location, sizes);
            }
            EventModifier::ExceptionOnly {
                exception_or_null,
                caught,
                uncaught,
            } => {
                w.write_u8(8);
                w.write_reference_type_id(exception_or_null, sizes);
                w.write_bool(caught);
                w.write_bool(uncaught);
            }
            EventModifier::FieldOnly { declaring, field } => {
                w.write_u8(9);
                w.write_reference_type_id(declaring, sizes);
                w.write_id(field, sizes.field_id);
            }
            EventModifier::Step {
                thread,
                size,
                depth,
            } => {
                w.write_u8(10);
                w.write_object_id(thread, sizes);
                w.write_u32(size);
                w.write_u32(depth);
            }
        }
    }
}

async fn read_loop(mut reader: tokio::net::tcp::OwnedReadHalf, inner: Arc<Inner>) {
    let mut terminated_with_error = false;

    loop {
        let mut header = [0u8; HEADER_LEN];
        let header_read = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_exact(&mut header) => res,
        };
        if header_read.is_err() {
            terminated_with_error = true;
            break;
        }

        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if length < HEADER_LEN {
            terminated_with_error = true;
            break;
        }

        let id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let flags = header[8];
        let mut payload = vec![0u8; length - HEADER_LEN];
        let payload_read = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_exact(&mut payload) => res,
        };
        if payload_read.is_err() {
            terminated_with_error = true;
            break;
        }

        if (flags & FLAG_REPLY) != 0 {
            let error_code = u16::from_be_bytes([header[9], header[10]]);
            let tx = {
                let mut pending = inner.pending.lock().await;
                pending.remove(&id)
            };

            if let Some(tx) = tx {
                let _ = tx.send(Ok(Reply {
                    error_code,
                    payload,
                }));
            }
        } else {
            let command_set = header[9];
            let command = header[10];
            if command_set == 64 && command == 100 {
                handle_event_packet(&inner, &payload).await;
            } else {
                // The only VM->debugger command we handle is Event.Composite.
                let _ = (id, command_set, command, payload);
            }
        }
    }

    inner.shutdown.cancel();

    if terminated_with_error {
        let pending = {
            let mut pending = inner.pending.lock().await;
            std::mem::take(&mut *pending)
        };
        for (_id, tx) in pending {
            let _ = tx.send(Err(JdwpError::ConnectionClosed));
        }
    }
}

async fn handle_event_packet(inner: &Inner, payload: &[u8]) {
    let sizes = *inner.id_sizes.lock().await;
    if let Err(err) = decode_composite(&sizes, payload, |event| {
        let _ = inner.events.send(event);
    }) {
        tracing::warn!(
            target: "jvmfs.jdwp",
            error = %err,
            "failed to decode composite event packet"
        );
    }
}

fn decode_composite(
    sizes: &JdwpIdSizes,
    payload: &[u8],
    mut sink: impl FnMut(JdwpEvent),
) -> Result<()> {
    let mut r = JdwpReader::new(payload);
    let _suspend_policy = r.read_u8()?;
    let event_count = r.read_u32()? as usize;

    for _ in 0..event_count {
        let kind = r.read_u8()?;
        let request_id = r.read_i32()?;
        let event = match EventKind::from_wire(kind) {
            Some(EventKind::VmStart) => JdwpEvent::VmStart {
                request_id,
                thread: r.read_object_id(sizes)?,
            },
            Some(EventKind::SingleStep) => JdwpEvent::SingleStep {
                request_id,
                thread: r.read_object_id(sizes)?,
                location: r.read_location(sizes)?,
            },
            Some(EventKind::Breakpoint) => JdwpEvent::Breakpoint {
                request_id,
                thread: r.read_object_id(sizes)?,
                location: r.read_location(sizes)?,
            },
            Some(EventKind::MethodEntry) => JdwpEvent::MethodEntry {
                request_id,
                thread: r.read_object_id(sizes)?,
                location: r.read_location(sizes)?,
            },
            Some(EventKind::MethodExit) => JdwpEvent::MethodExit {
                request_id,
                thread: r.read_object_id(sizes)?,
                location: r.read_location(sizes)?,
            },
            Some(EventKind::Exception) => {
                let thread = r.read_object_id(sizes)?;
                let location = r.read_location(sizes)?;
                let _exception_tag = r.read_u8()?;
                let exception = r.read_object_id(sizes)?;
                let catch_loc = r.read_location(sizes)?;
                let catch_location = if catch_loc.type_tag == 0
                    && catch_loc.class_id == 0
                    && catch_loc.method_id == 0
                    && catch_loc.index == 0
                {
                    None
                } else {
                    Some(catch_loc)
                };
                JdwpEvent::Exception {
                    request_id,
                    thread,
                    location,
                    exception,
                    catch_location,
                }
            }
            Some(EventKind::ThreadStart) => JdwpEvent::ThreadStart {
                request_id,
                thread: r.read_object_id(sizes)?,
            },
            Some(EventKind::ThreadDeath) => JdwpEvent::ThreadDeath {
                request_id,
                thread: r.read_object_id(sizes)?,
            },
            Some(EventKind::ClassPrepare) => JdwpEvent::ClassPrepare {
                request_id,
                thread: r.read_object_id(sizes)?,
                ref_type_tag: r.read_u8()?,
                type_id: r.read_reference_type_id(sizes)?,
                signature: r.read_string()?,
                status: r.read_u32()?,
            },
            Some(EventKind::ClassUnload) => JdwpEvent::ClassUnload {
                request_id,
                signature: r.read_string()?,
            },
            Some(EventKind::FieldAccess) => {
                let thread = r.read_object_id(sizes)?;
                let location = r.read_location(sizes)?;
                let ref_type_tag = r.read_u8()?;
                let type_id = r.read_reference_type_id(sizes)?;
                let field_id = r.read_id(sizes.field_id)?;
                let _object_tag = r.read_u8()?;
                let object = r.read_object_id(sizes)?;
                JdwpEvent::FieldAccess {
                    request_id,
                    thread,
                    location,
                    ref_type_tag,
                    type_id,
                    field_id,
                    object,
                }
            }
            Some(EventKind::FieldModification) => {
                let thread = r.read_object_id(sizes)?;
                let location = r.read_location(sizes)?;
                let ref_type_tag = r.read_u8()?;
                let type_id = r.read_reference_type_id(sizes)?;
                let field_id = r.read_id(sizes.field_id)?;
                let _object_tag = r.read_u8()?;
                let object = r.read_object_id(sizes)?;
                let value_tag = r.read_u8()?;
                let value = r.read_value(value_tag, sizes)?;
                JdwpEvent::FieldModification {
                    request_id,
                    thread,
                    location,
                    ref_type_tag,
                    type_id,
                    field_id,
                    object,
                    value,
                }
            }
            Some(EventKind::VmDeath) => JdwpEvent::VmDeath { request_id },
            Some(_) | None => {
                // A kind we cannot decode has an unknown payload size, so the
                // rest of the composite packet is unreadable.
                return Err(JdwpError::Protocol(format!(
                    "unsupported event kind {kind} in composite packet"
                )));
            }
        };
        sink(event);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClass, MockJvm, MockJvmConfig, MockThread};
    use crate::types::JdwpValue;

    fn test_config() -> MockJvmConfig {
        MockJvmConfig {
            threads: vec![
                MockThread {
                    id: 100,
                    name: "main".to_string(),
                },
                MockThread {
                    id: 101,
                    name: "worker".to_string(),
                },
            ],
            classes: vec![MockClass {
                type_id: 42,
                ref_type_tag: 1,
                signature: "Lcom/example/Main;".to_string(),
                methods: vec![MethodInfo {
                    method_id: 7,
                    name: "main".to_string(),
                    signature: "([Ljava/lang/String;)V".to_string(),
                    mod_bits: 9,
                }],
                fields: vec![FieldInfo {
                    field_id: 3,
                    name: "counter".to_string(),
                    signature: "I".to_string(),
                    mod_bits: 2,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn enumerates_threads_and_names() {
        let jvm = MockJvm::spawn_with_config(test_config()).await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();

        let threads = client.all_threads().await.unwrap();
        assert_eq!(threads, vec![100, 101]);
        assert_eq!(client.thread_name(100).await.unwrap(), "main");
        assert_eq!(client.thread_name(101).await.unwrap(), "worker");

        client.shutdown();
        jvm.shutdown();
    }

    #[tokio::test]
    async fn suspend_and_resume_change_thread_status() {
        let jvm = MockJvm::spawn_with_config(test_config()).await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();

        let (_, suspend) = client.thread_status(100).await.unwrap();
        assert!(suspend.is_running());

        client.suspend_thread(100).await.unwrap();
        let (_, suspend) = client.thread_status(100).await.unwrap();
        assert!(suspend.is_suspended());
        let (_, other) = client.thread_status(101).await.unwrap();
        assert!(other.is_running());

        client.resume_thread(100).await.unwrap();
        let (_, suspend) = client.thread_status(100).await.unwrap();
        assert!(suspend.is_running());

        client.suspend_all().await.unwrap();
        let (_, suspend) = client.thread_status(101).await.unwrap();
        assert!(suspend.is_suspended());
        client.resume_all().await.unwrap();

        client.shutdown();
        jvm.shutdown();
    }

    #[tokio::test]
    async fn lists_classes_methods_and_fields() {
        let jvm = MockJvm::spawn_with_config(test_config()).await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();

        let classes = client.all_classes().await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].type_id, 42);
        assert_eq!(classes[0].signature, "Lcom/example/Main;");

        let methods = client.methods(42).await.unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "main");

        let fields = client.fields(42).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "counter");

        client.shutdown();
        jvm.shutdown();
    }

    #[tokio::test]
    async fn unknown_class_yields_vm_error() {
        let jvm = MockJvm::spawn_with_config(test_config()).await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();

        match client.methods(999).await {
            Err(JdwpError::VmError(_)) => {}
            other => panic!("expected VM error, got {other:?}"),
        }

        client.shutdown();
        jvm.shutdown();
    }

    #[tokio::test]
    async fn watch_events_delivers_and_clears() {
        let jvm = MockJvm::spawn_with_config(test_config()).await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();

        let cancel = CancellationToken::new();
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = {
            let client = client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .watch_events(
                        cancel,
                        EventKind::MethodEntry,
                        SuspendPolicy::None,
                        vec![EventModifier::LocationOnly {
                            location: Location {
                                type_tag: 1,
                                class_id: 42,
                                method_id: 7,
                                index: 0,
                            },
                        }],
                        move |event| {
                            let _ = seen_tx.send(event.clone());
                        },
                    )
                    .await
            })
        };

        let request_id = jvm.wait_for_request(EventKind::MethodEntry).await;
        jvm.emit_method_entry(request_id, 100).await;

        let event = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind(), EventKind::MethodEntry);
        assert_eq!(event.request_id(), request_id);

        cancel.cancel();
        watcher.await.unwrap().unwrap();
        assert!(jvm.cleared_requests().await.contains(&request_id));

        client.shutdown();
        jvm.shutdown();
    }

    #[tokio::test]
    async fn vm_death_is_delivered_to_vm_death_watchers() {
        let jvm = MockJvm::spawn_with_config(test_config()).await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();

        let cancel = CancellationToken::new();
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = {
            let client = client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .watch_events(
                        cancel,
                        EventKind::VmDeath,
                        SuspendPolicy::None,
                        Vec::new(),
                        move |event| {
                            let _ = seen_tx.send(event.clone());
                        },
                    )
                    .await
            })
        };

        let _ = jvm.wait_for_request(EventKind::VmDeath).await;
        // Automatic VM death carries request id 0.
        jvm.emit_vm_death(0).await;

        let event = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, JdwpEvent::VmDeath { .. }));

        cancel.cancel();
        watcher.await.unwrap().unwrap();

        client.shutdown();
        jvm.shutdown();
    }

    #[test]
    fn composite_decoding_handles_field_modification() {
        let sizes = JdwpIdSizes::default();
        let mut w = JdwpWriter::new();
        w.write_u8(0); // suspend policy
        w.write_u32(1);
        w.write_u8(EventKind::FieldModification.wire_value());
        w.write_i32(9);
        w.write_object_id(100, &sizes);
        w.write_location(
            &Location {
                type_tag: 1,
                class_id: 42,
                method_id: 7,
                index: 3,
            },
            &sizes,
        );
        w.write_u8(1); // refTypeTag
        w.write_reference_type_id(42, &sizes);
        w.write_id(3, sizes.field_id);
        w.write_u8(b'L'); // object tag
        w.write_object_id(500, &sizes);
        w.write_u8(b'I');
        w.write_i32(17);
        let payload = w.into_vec();

        let mut events = Vec::new();
        decode_composite(&sizes, &payload, |event| events.push(event)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            JdwpEvent::FieldModification {
                request_id,
                thread,
                field_id,
                value,
                ..
            } => {
                assert_eq!(*request_id, 9);
                assert_eq!(*thread, 100);
                assert_eq!(*field_id, 3);
                assert_eq!(value, &JdwpValue::Int(17));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
