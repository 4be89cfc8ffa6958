//! Reorder buffer (§4.10): routes asynchronous memory responses back to
//! the cooperative worker that issued the request, by request id.

use std::collections::HashMap;

pub type ReqId = u64;
pub type WorkerId = u64;

#[derive(Default)]
pub struct ReorderBuffer {
    owners: HashMap<ReqId, WorkerId>,
    responses: HashMap<WorkerId, Vec<u8>>,
    next_req_id: ReqId,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        ReorderBuffer {
            owners: HashMap::new(),
            responses: HashMap::new(),
            next_req_id: 1,
        }
    }

    /// Register a new outstanding request and return its id.
    pub fn register_request(&mut self, worker: WorkerId) -> ReqId {
        let id = self.next_req_id;
        self.next_req_id += 1;
        self.owners.insert(id, worker);
        id
    }

    pub fn look_up_worker(&self, req_id: ReqId) -> Option<WorkerId> {
        self.owners.get(&req_id).copied()
    }

    /// Store a response's payload under its owning worker and drop the
    /// request id. A lookup miss is not an error (§7): the request may
    /// have been cancelled/discarded already.
    pub fn store_response(&mut self, req_id: ReqId, data: Vec<u8>) {
        if let Some(worker) = self.owners.remove(&req_id) {
            self.responses.insert(worker, data);
        }
    }

    /// Store a response into a byte offset of the worker's pre-sized
    /// burst buffer (burst-read mode).
    pub fn store_burst_response(&mut self, req_id: ReqId, offset: usize, chunk: &[u8]) {
        if let Some(worker) = self.owners.remove(&req_id) {
            let buf = self.responses.entry(worker).or_insert_with(Vec::new);
            if buf.len() < offset + chunk.len() {
                buf.resize(offset + chunk.len(), 0);
            }
            buf[offset..offset + chunk.len()].copy_from_slice(chunk);
        }
    }

    /// Take the response delivered for `worker`, if any has arrived.
    pub fn take_response(&mut self, worker: WorkerId) -> Option<Vec<u8>> {
        self.responses.remove(&worker)
    }

    pub fn reset(&mut self) {
        self.owners.clear();
        self.responses.clear();
    }
}
