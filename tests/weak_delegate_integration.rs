//! Integration tests for weak_delegate
//!
//! Exercises weak combination end to end: subscriber lifetime, call order,
//! removal and compaction running on the alert scheduler.

use std::{
  sync::{Arc, Mutex},
  thread,
  time::{Duration, Instant},
};

use weak_delegate::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

struct Handler {
  name: &'static str,
  log: Log,
}

impl Handler {
  fn new(log: &Log, name: &'static str) -> Tracked<Self> {
    Tracked::new(Handler { name, log: log.clone() })
  }

  fn handle(&self, (sender, item): (&'static str, i32)) {
    self.log.lock().unwrap().push(format!("{}<-{sender}:{item}", self.name));
  }
}

fn handle(target: &Tracked<Handler>) -> Callback<(&'static str, i32)> {
  Callback::bound(target, "Handler::handle", Handler::handle)
}

fn drain(log: &Log) -> Vec<String> { std::mem::take(&mut *log.lock().unwrap()) }

fn eventually(mut done: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + Duration::from_secs(5);
  while !done() {
    if Instant::now() > deadline {
      return false;
    }
    thread::sleep(Duration::from_millis(1));
  }
  true
}

#[test]
fn test_dropped_subscriber_is_never_called() {
  let log = Log::default();
  let first = Handler::new(&log, "first");
  let changed = combine(None, Some(&handle(&first))).unwrap();
  changed.call(("collection", 1));
  assert_eq!(drain(&log), vec!["first<-collection:1"]);

  drop(first);
  assert_eq!(changed.call(("collection", 2)), None);
  assert!(drain(&log).is_empty());

  let second = Handler::new(&log, "second");
  let changed = combine(Some(&changed), Some(&handle(&second))).unwrap();
  assert_eq!(changed.call(("collection", 3)), Some(()));
  assert_eq!(drain(&log), vec!["second<-collection:3"]);
}

#[test]
fn test_compaction_follows_collection() {
  let log = Log::default();
  let (a, b, c) = (Handler::new(&log, "a"), Handler::new(&log, "b"), Handler::new(&log, "c"));
  let ab = combine(Some(&handle(&a)), Some(&handle(&b))).unwrap();
  let surrogate = surrogate_of(&ab).unwrap();
  assert_eq!(surrogate.len(), 2);

  drop(b);
  assert!(eventually(|| surrogate.len() == 1));
  assert_eq!(surrogate.live_len(), 1);

  let abc = combine(Some(&ab), Some(&handle(&c))).unwrap();
  abc.call(("s", 0));
  assert_eq!(drain(&log), vec!["a<-s:0", "c<-s:0"]);
  drop((a, c));
}

#[test]
fn test_interior_death_keeps_order() {
  let log = Log::default();
  let handlers: Vec<_> = ["h0", "h1", "h2", "h3", "h4"]
    .into_iter()
    .map(|name| Handler::new(&log, name))
    .collect();
  let mut chain: Option<Callback<(&'static str, i32)>> = None;
  for handler in &handlers {
    chain = combine_event(chain.as_ref(), Some(&handle(handler)));
  }
  let chain = chain.unwrap();

  let mut handlers = handlers;
  handlers.remove(3);
  handlers.remove(1);
  chain.call(("s", 1));
  assert_eq!(drain(&log), vec!["h0<-s:1", "h2<-s:1", "h4<-s:1"]);
}

#[test]
fn test_concurrent_drops_and_calls() {
  let log = Log::default();
  let handlers: Vec<_> = (0..16).map(|_| Handler::new(&log, "h")).collect();
  let mut chain: Option<Callback<(&'static str, i32)>> = None;
  for handler in &handlers {
    chain = combine_event(chain.as_ref(), Some(&handle(handler)));
  }
  let chain = chain.unwrap();

  let callers: Vec<_> = (0..4)
    .map(|t| {
      let chain = chain.clone();
      thread::spawn(move || {
        for i in 0..100 {
          chain.call(("thread", t * 1000 + i));
        }
      })
    })
    .collect();
  let keep: Vec<_> = handlers.into_iter().take(4).collect();
  for caller in callers {
    caller.join().unwrap();
  }

  let surrogate = surrogate_of(&chain).unwrap();
  surrogate.compact();
  assert_eq!(surrogate.len(), 4);
  drain(&log);
  chain.call(("main", -1));
  assert_eq!(drain(&log).len(), 4);
  drop(keep);
}

#[test]
fn test_closures_are_held_weakly() {
  let hits = Arc::new(Mutex::new(0));
  let c_hits = hits.clone();
  let closure = Callback::from_closure(move |_: (&'static str, i32)| *c_hits.lock().unwrap() += 1);
  let composite = combine(Some(&closure), None).unwrap();
  composite.call(("s", 0));
  assert_eq!(*hits.lock().unwrap(), 1);

  drop(closure);
  assert_eq!(composite.call(("s", 1)), None);
  assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn test_static_functions_never_die() {
  fn double(v: u64) -> u64 { v * 2 }
  let composite = combine(Some(&Callback::from_fn(double)), None).unwrap();
  assert_eq!(composite.call(21), Some(42));
}

#[test]
fn test_last_result_wins() {
  fn one(_: ()) -> u8 { 1 }
  fn two(_: ()) -> u8 { 2 }
  let composite =
    combine(Some(&Callback::from_fn(one)), Some(&Callback::from_fn(two))).unwrap();
  assert_eq!(composite.call(()), Some(2));
  let reversed = combine(Some(&Callback::from_fn(two)), Some(&Callback::from_fn(one))).unwrap();
  assert_eq!(reversed.call(()), Some(1));
}

#[test]
fn test_event_lifecycle() {
  let log = Log::default();
  let a = Handler::new(&log, "a");
  let b = Handler::new(&log, "b");
  let mut events = EventSet::new();
  events.declare("collection_changed");
  events.subscribe("collection_changed", &handle(&a));
  events.subscribe("collection_changed", &handle(&b));

  events.raise("collection_changed", ("list", 1));
  assert_eq!(drain(&log), vec!["a<-list:1", "b<-list:1"]);

  drop(a);
  events.raise("collection_changed", ("list", 2));
  assert_eq!(drain(&log), vec!["b<-list:2"]);

  remove_from_event(Some(&mut events), "collection_changed", Some(&handle(&b))).unwrap();
  assert_eq!(events.raise("collection_changed", ("list", 3)), None);
  assert!(drain(&log).is_empty());

  assert_eq!(
    remove_from_event(Some(&mut events), "collection_changing", Some(&handle(&b))),
    Err(Error::UnknownEvent("collection_changing".into()))
  );
}
