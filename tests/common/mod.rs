//! In-process stand-in for the deque server script.
//!
//! Implements just enough of the procedure surface for the client tests,
//! records every call it receives and can inject faults.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tarantool_deque::codec::Call;
use tarantool_deque::connection::{Connection, Connector, Response};
use tarantool_deque::{Deque, DequeConfig, Error, Result, TaskState};

/// Something to go wrong on the next call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Transport failure.
    Network,
    /// Application error from the server.
    Remote(u32, &'static str),
    /// Never reply.
    Hang,
}

#[derive(Debug, Clone)]
struct StoredTask {
    state: TaskState,
    data: Value,
}

#[derive(Default)]
struct ServerState {
    next_id: u64,
    tubes: BTreeMap<String, BTreeMap<u64, StoredTask>>,
    calls: Vec<Call>,
    connects: usize,
    refuse_connect: bool,
    faults: VecDeque<Fault>,
    hang_on_empty_take: bool,
    bare_rows: bool,
}

enum Reply {
    Done(Result<Response>),
    Hang,
}

#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deque(&self) -> Deque<FakeServer> {
        let config = DequeConfig::new("127.0.0.1", 33016).credentials("test", "test");
        Deque::new(config, self.clone()).expect("valid config")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn last_call(&self) -> Call {
        self.calls().pop().expect("no calls recorded")
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_connect = refuse;
    }

    pub fn inject(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    /// Make `take` on an empty tube block until the client gives up.
    pub fn hang_on_empty_take(&self, hang: bool) {
        self.state.lock().unwrap().hang_on_empty_take = hang;
    }

    /// Answer ack, release, bury and touch with `(id, state)` only.
    pub fn bare_rows(&self, bare: bool) {
        self.state.lock().unwrap().bare_rows = bare;
    }

    /// Poll until a task reaches `want` server-side, for background calls.
    pub async fn wait_for_state(&self, tube: &str, id: u64, want: TaskState) -> bool {
        for _ in 0..100 {
            if self.state_of(tube, id) == Some(want) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        false
    }

    /// Server-side state of a task, bypassing the client.
    pub fn state_of(&self, tube: &str, id: u64) -> Option<TaskState> {
        let state = self.state.lock().unwrap();
        state.tubes.get(tube)?.get(&id).map(|t| t.state)
    }

    /// Force a server-side state change (timers, ttr expiry).
    pub fn set_state(&self, tube: &str, id: u64, to: TaskState) {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.tubes.get_mut(tube).and_then(|t| t.get_mut(&id)) {
            task.state = to;
        }
    }

    fn handle(&self, call: &Call) -> Reply {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());

        match state.faults.pop_front() {
            Some(Fault::Network) => {
                return Reply::Done(Err(Error::Connection("connection reset by peer".into())));
            }
            Some(Fault::Remote(code, message)) => {
                return Reply::Done(Err(Error::Remote {
                    code,
                    message: message.to_string(),
                }));
            }
            Some(Fault::Hang) => return Reply::Hang,
            None => {}
        }

        if call.function() == "deque.statistics" {
            return Reply::Done(Ok(statistics(&state, call.args().first())));
        }

        let Some((tube, op)) = call
            .function()
            .strip_prefix("deque.tube.")
            .and_then(|rest| rest.split_once(':'))
        else {
            return Reply::Done(Err(remote(32, "no such procedure")));
        };
        let tube = tube.to_string();
        let args = call.args();

        if op == "take" {
            let ready = state
                .tubes
                .get(&tube)
                .and_then(|t| t.iter().find(|(_, task)| task.state == TaskState::Ready))
                .map(|(id, _)| *id);
            return match ready {
                Some(id) => Reply::Done(Ok(transition(&mut state, &tube, id, TaskState::Taken))),
                None if state.hang_on_empty_take => Reply::Hang,
                None => Reply::Done(Ok(Response::empty())),
            };
        }

        let result = match op {
            "put" => {
                state.next_id += 1;
                let id = state.next_id;
                let delayed = args[3].as_f64().unwrap_or(0.0) > 0.0;
                let task = StoredTask {
                    state: if delayed {
                        TaskState::Delayed
                    } else {
                        TaskState::Ready
                    },
                    data: args[0].clone(),
                };
                let reply = row(id, &task);
                state.tubes.entry(tube).or_default().insert(id, task);
                Ok(reply)
            }
            "ack" => with_task(&mut state, &tube, &args[0], |s| {
                (s == TaskState::Taken).then_some(TaskState::Done)
            }),
            "release" => {
                let delayed = args[1].as_f64().unwrap_or(0.0) > 0.0;
                with_task(&mut state, &tube, &args[0], |s| {
                    (s == TaskState::Taken).then_some(if delayed {
                        TaskState::Delayed
                    } else {
                        TaskState::Ready
                    })
                })
            }
            "bury" => with_task(&mut state, &tube, &args[0], |s| {
                matches!(s, TaskState::Ready | TaskState::Taken).then_some(TaskState::Buried)
            }),
            "touch" => with_task(&mut state, &tube, &args[0], |s| {
                (s == TaskState::Taken).then_some(s)
            }),
            "peek" => with_task(&mut state, &tube, &args[0], Some),
            "delete" => {
                let id = args[0].as_u64().unwrap_or_default();
                match state.tubes.get_mut(&tube).and_then(|t| t.remove(&id)) {
                    Some(mut task) => {
                        task.state = TaskState::Done;
                        Ok(row(id, &task))
                    }
                    None => Err(remote(404, "task not found")),
                }
            }
            "kick" => {
                let limit = args[0].as_u64().unwrap_or_default();
                let mut moved = 0;
                if let Some(tasks) = state.tubes.get_mut(&tube) {
                    for task in tasks.values_mut() {
                        if moved == limit {
                            break;
                        }
                        if task.state == TaskState::Buried {
                            task.state = TaskState::Ready;
                            moved += 1;
                        }
                    }
                }
                Ok(Response::single(vec![json!(moved)]))
            }
            "drop" => {
                let busy = state
                    .tubes
                    .get(&tube)
                    .is_some_and(|t| t.values().any(|task| task.state == TaskState::Taken));
                if !busy {
                    state.tubes.remove(&tube);
                }
                Ok(Response::single(vec![json!(!busy)]))
            }
            _ => Err(remote(32, "no such procedure")),
        };
        if state.bare_rows && matches!(op, "ack" | "release" | "bury" | "touch") {
            return Reply::Done(result.map(|r| without_data(&r)));
        }
        Reply::Done(result)
    }
}

fn remote(code: u32, message: &str) -> Error {
    Error::Remote {
        code,
        message: message.to_string(),
    }
}

fn row(id: u64, task: &StoredTask) -> Response {
    Response::single(vec![json!(id), json!(task.state.tag()), task.data.clone()])
}

fn without_data(response: &Response) -> Response {
    let tuples = response
        .tuples()
        .iter()
        .map(|t| t.iter().take(2).cloned().collect::<Vec<Value>>())
        .collect();
    Response::new(tuples)
}

fn transition(state: &mut ServerState, tube: &str, id: u64, to: TaskState) -> Response {
    let task = state
        .tubes
        .get_mut(tube)
        .and_then(|t| t.get_mut(&id))
        .expect("task exists");
    task.state = to;
    row(id, task)
}

/// Apply `next` to a stored task; `None` means the server rejects the call.
fn with_task(
    state: &mut ServerState,
    tube: &str,
    id: &Value,
    next: impl FnOnce(TaskState) -> Option<TaskState>,
) -> Result<Response> {
    let id = id.as_u64().unwrap_or_default();
    let Some(task) = state.tubes.get_mut(tube).and_then(|t| t.get_mut(&id)) else {
        return Err(remote(404, "task not found"));
    };
    match next(task.state) {
        Some(to) => {
            task.state = to;
            Ok(row(id, task))
        }
        None => Err(remote(
            409,
            &format!("task {id} is {}", task.state.name()),
        )),
    }
}

fn tube_counters(tasks: &BTreeMap<u64, StoredTask>) -> Value {
    let count = |s: TaskState| tasks.values().filter(|t| t.state == s).count();
    json!({
        "tasks": {
            "ready": count(TaskState::Ready),
            "taken": count(TaskState::Taken),
            "delayed": count(TaskState::Delayed),
            "buried": count(TaskState::Buried),
            "done": count(TaskState::Done),
            "total": tasks.len(),
        }
    })
}

fn statistics(state: &ServerState, tube: Option<&Value>) -> Response {
    let empty = BTreeMap::new();
    match tube.and_then(Value::as_str) {
        Some(name) => {
            let tasks = state.tubes.get(name).unwrap_or(&empty);
            Response::single(vec![tube_counters(tasks)])
        }
        None => {
            let all: serde_json::Map<String, Value> = state
                .tubes
                .iter()
                .map(|(name, tasks)| (name.clone(), tube_counters(tasks)))
                .collect();
            Response::single(vec![Value::Object(all)])
        }
    }
}

pub struct FakeConnection {
    server: FakeServer,
}

impl Connection for FakeConnection {
    async fn call(&mut self, call: &Call) -> Result<Response> {
        match self.server.handle(call) {
            Reply::Done(result) => result,
            Reply::Hang => std::future::pending().await,
        }
    }
}

impl Connector for FakeServer {
    type Connection = FakeConnection;

    async fn connect(&self, config: &DequeConfig) -> Result<FakeConnection> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_connect {
            return Err(Error::Connection(format!(
                "{} refused connection",
                config.address()
            )));
        }
        state.connects += 1;
        Ok(FakeConnection {
            server: self.clone(),
        })
    }
}
