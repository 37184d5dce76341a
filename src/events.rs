//! Server event notification over the auxiliary channel.
//!
//! The server posts `op_event` packets on a second socket obtained via
//! `op_connect_request`. Each interest registration carries the counts
//! seen so far, the first delivery only establishes that baseline and
//! is not surfaced to the handler.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;

use crate::{
    Result,
    attachment::DbAttachment,
    common::{debug, span, verbose},
    error::StateError,
    gds::*,
    net::Socket,
    wire::{WireStream, protocol},
};

/// Called with the event name and how many times it fired.
pub type EventHandler = Box<dyn FnMut(&str, u32) + Send + 'static>;

struct EventState {
    names: Vec<String>,
    counts: Vec<u32>,
    primed: bool,
}

impl EventState {
    fn build_epb(&self) -> Vec<u8> {
        let mut epb = Vec::with_capacity(self.names.len() * 16);
        for (name, count) in self.names.iter().zip(&self.counts) {
            epb.push(name.len().min(255) as u8);
            epb.extend_from_slice(&name.as_bytes()[..name.len().min(255)]);
            epb.extend_from_slice(&count.to_le_bytes());
        }
        epb
    }

    /// Updated counts from a delivery, in registration order.
    fn parse_epb(&self, buffer: &[u8]) -> Result<Vec<u32>> {
        if buffer.first() != Some(&EPB_VERSION1) {
            return Err(protocol!("malformed event parameter buffer").into());
        }
        let mut counts = self.counts.clone();
        let mut pos = 1;
        while pos < buffer.len() {
            let len = buffer[pos] as usize;
            pos += 1;
            if pos + len + 4 > buffer.len() {
                return Err(protocol!("malformed event parameter buffer").into());
            }
            let name = &buffer[pos..pos + len];
            pos += len;
            let count = u32::from_le_bytes(buffer[pos..pos + 4].try_into().unwrap());
            pos += 4;
            if let Some(index) = self.names.iter().position(|n| n.as_bytes() == name) {
                counts[index] = count;
            }
        }
        Ok(counts)
    }
}

/// A live event subscription with its own reader thread.
///
/// [`stop`][EventListener::stop] cancels the registration and joins the
/// thread. Dropping without stopping shuts the auxiliary socket down
/// and leaves the thread to exit on its own.
pub struct EventListener {
    db: DbAttachment,
    aux: Socket,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    local_id: i32,
}

impl EventListener {
    /// Register interest in `names` and start delivering to `handler`.
    pub fn start(
        db: &DbAttachment,
        names: &[&str],
        handler: impl FnMut(&str, u32) + Send + 'static,
    ) -> Result<Self> {
        span!("events_start");
        let (host, timeout) = {
            let att = db.inner.lock();
            (att.params().host.clone(), att.params().timeout)
        };
        let (_aux_id, port) = db.inner.lock().connection_request()?;
        verbose!("event channel on {host}:{port}");
        let aux = Socket::connect(&host, port, timeout)
            .map_err(|_| crate::error::GdsError::raise(ISC_NETWORK_ERROR, &[&host]))?;
        Self::spawn(db.clone(), aux, names, Box::new(handler))
    }

    pub(crate) fn spawn(
        db: DbAttachment,
        aux: Socket,
        names: &[&str],
        handler: EventHandler,
    ) -> Result<Self> {
        let state = EventState {
            names: names.iter().map(|n| n.to_string()).collect(),
            counts: vec![0; names.len()],
            primed: false,
        };
        let local_id = 1;
        que_events(&db, &state, local_id)?;

        let stop = Arc::new(AtomicBool::new(false));
        let aux_reader = aux.try_clone().map_err(crate::Error::from)?;
        let thread = {
            let db = db.clone();
            let stop = stop.clone();
            std::thread::spawn(move || run(db, aux_reader, state, handler, stop, local_id))
        };

        Ok(Self { db, aux, stop, thread: Some(thread), local_id })
    }

    /// Cancel the registration and join the reader thread.
    pub fn stop(mut self) -> Result<()> {
        if self.stop.swap(true, Ordering::SeqCst) {
            return Err(StateError::EventsStopped.into());
        }
        let result = {
            let mut att = self.db.inner.lock();
            let handle = att.handle();
            att.stream().write_i32(OP_CANCEL_EVENTS);
            att.stream().write_i32(handle);
            att.stream().write_i32(self.local_id);
            att.stream().flush()?;
            att.receive_response().map(|_| ())
        };
        self.aux.shutdown().ok();
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn join_for_test(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.aux.shutdown().ok();
    }
}

/// Register the current counts with the server.
fn que_events(db: &DbAttachment, state: &EventState, local_id: i32) -> Result<()> {
    let epb = state.build_epb();
    let mut att = db.inner.lock();
    let handle = att.handle();
    att.stream().write_i32(OP_QUE_EVENTS);
    att.stream().write_i32(handle);
    att.stream().write_typed(EPB_VERSION1, &epb);
    att.stream().write_i32(0); // ast
    att.stream().write_i32(0); // args
    att.stream().write_i32(local_id);
    att.stream().flush()?;
    att.receive_response()?;
    Ok(())
}

fn run(
    db: DbAttachment,
    aux: Socket,
    mut state: EventState,
    mut handler: EventHandler,
    stop: Arc<AtomicBool>,
    local_id: i32,
) {
    let mut stream = WireStream::new(aux);
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let op = match stream.read_i32() {
            Ok(op) => op,
            Err(_) => return,
        };
        match op {
            OP_DUMMY => continue,
            OP_EVENT => {
                let delivery = read_event(&mut stream, &state);
                let counts = match delivery {
                    Ok(counts) => counts,
                    Err(_) => return,
                };
                let previous = std::mem::replace(&mut state.counts, counts);
                let primed = std::mem::replace(&mut state.primed, true);

                if stop.load(Ordering::SeqCst) {
                    return;
                }
                if que_events(&db, &state, local_id).is_err() {
                    return;
                }
                if primed {
                    for (index, name) in state.names.iter().enumerate() {
                        let fired = state.counts[index].wrapping_sub(previous[index]);
                        if fired > 0 {
                            handler(name, fired);
                        }
                    }
                } else {
                    debug!("event baseline established");
                }
            }
            OP_EXIT | OP_DISCONNECT => return,
            _ => return,
        }
    }
}

/// One `op_event` packet: attachment handle, counts buffer, ast info
/// and the registration id.
fn read_event(stream: &mut WireStream, state: &EventState) -> Result<Vec<u32>> {
    let _db_handle = stream.read_i32()?;
    let buffer = stream.read_buffer()?;
    let _ast = stream.read_i64()?;
    let _event_id = stream.read_i32()?;
    state.parse_epb(&buffer)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::mock::MockSocket;
    use crate::testutil::*;
    use parking_lot::Mutex;

    fn event_packet(names: &[(&str, u32)]) -> Vec<u8> {
        let mut epb = vec![EPB_VERSION1];
        for (name, count) in names {
            epb.push(name.len() as u8);
            epb.extend_from_slice(name.as_bytes());
            epb.extend_from_slice(&count.to_le_bytes());
        }
        let mut out = Vec::new();
        push_i32(&mut out, OP_EVENT);
        push_i32(&mut out, 1); // attachment handle
        push_buffer(&mut out, &epb);
        push_i64(&mut out, 0);
        push_i32(&mut out, 1); // registration id
        out
    }

    #[test]
    fn epb_carries_names_and_counts() {
        let state = EventState {
            names: vec!["NEW_ORDER".into()],
            counts: vec![3],
            primed: true,
        };
        let epb = state.build_epb();
        assert_eq!(epb[0], 9);
        assert_eq!(&epb[1..10], b"NEW_ORDER");
        assert_eq!(&epb[10..14], 3u32.to_le_bytes());
    }

    #[test]
    fn first_delivery_only_primes_the_baseline() {
        let main = MockSocket::new();
        let db = test_db(&main);
        let aux = MockSocket::new();

        // queue, requeue after prime, requeue after the real event
        main.push_input(&ok_response(0));
        main.push_input(&ok_response(0));
        main.push_input(&ok_response(0));
        aux.push_input(&event_packet(&[("NEW_ORDER", 5)]));
        aux.push_input(&event_packet(&[("NEW_ORDER", 7)]));

        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let mut listener = EventListener::spawn(
            db,
            Socket::Mock(aux.clone()),
            &["NEW_ORDER"],
            Box::new(move |name, count| sink.lock().push((name.to_string(), count))),
        )
        .unwrap();
        listener.join_for_test();

        // baseline 5 swallowed, then the delta of the second delivery
        assert_eq!(*fired.lock(), vec![("NEW_ORDER".to_string(), 2)]);
    }

    #[test]
    fn stop_cancels_the_registration() {
        let main = MockSocket::new();
        let db = test_db(&main);
        let aux = MockSocket::new();

        main.push_input(&ok_response(0));
        let listener = EventListener::spawn(
            db,
            Socket::Mock(aux.clone()),
            &["PING"],
            Box::new(|_, _| {}),
        )
        .unwrap();

        main.push_input(&ok_response(0));
        listener.stop().unwrap();

        let written = main.written();
        let mut cancel = Vec::new();
        push_i32(&mut cancel, OP_CANCEL_EVENTS);
        assert!(written.windows(4).any(|w| w == &cancel[..]));
    }
}
