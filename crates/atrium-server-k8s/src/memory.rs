// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-process store with API-server semantics.
//!
//! Used for `store.backend = "memory"` dev mode and as the test double for
//! every reconciler. It keeps the behaviours the engine relies on:
//! generation bumps on spec change, resourceVersion preconditions,
//! deletion guards, owner-reference cascading delete, namespace teardown
//! and resumable watches. Tests can read the operation journal and inject
//! one-shot failures to simulate a crash between two writes.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

use crate::client::{FieldFilter, ResourceStore, WatchEvent, WatchStream};
use crate::error::{K8sError, K8sResult};
use crate::object::{ObjectKey, StoreObject};

const HISTORY_CAPACITY: usize = 1024;
const FOREGROUND_DELETION: &str = "foregroundDeletion";

/// Store operation recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
	Create,
	Update,
	PatchStatus,
	Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
	pub verb: Verb,
	pub kind: String,
	pub key: ObjectKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventType {
	Added,
	Modified,
	Deleted,
}

#[derive(Debug)]
struct StoredEvent {
	kind: String,
	key: ObjectKey,
	resource_version: u64,
	event_type: EventType,
	object: Value,
}

type Slot = (String, ObjectKey);

struct State {
	objects: BTreeMap<Slot, Value>,
	next_version: u64,
	history: VecDeque<Arc<StoredEvent>>,
	journal: Vec<JournalEntry>,
	faults: Vec<(Verb, String)>,
	events: broadcast::Sender<Arc<StoredEvent>>,
}

/// In-memory [`ResourceStore`].
pub struct InMemoryStore {
	state: Mutex<State>,
	active_watches: Arc<AtomicUsize>,
}

impl Default for InMemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryStore {
	/// Empty store holding only the `default` namespace.
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(HISTORY_CAPACITY);
		let mut state = State {
			objects: BTreeMap::new(),
			next_version: 1,
			history: VecDeque::new(),
			journal: Vec::new(),
			faults: Vec::new(),
			events,
		};
		let mut default_ns = Map::new();
		default_ns.insert("apiVersion".into(), Value::from("v1"));
		default_ns.insert("kind".into(), Value::from("Namespace"));
		default_ns.insert("metadata".into(), serde_json::json!({ "name": "default" }));
		state.insert_new(kind_of::<Namespace>(), ObjectKey::cluster("default"), Value::Object(default_ns));
		state.journal.clear();

		Self {
			state: Mutex::new(state),
			active_watches: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Operations performed so far, oldest first.
	pub fn journal(&self) -> Vec<JournalEntry> {
		self.lock().journal.clone()
	}

	pub fn clear_journal(&self) {
		self.lock().journal.clear();
	}

	/// Make the next `verb` against `kind` fail with an API error.
	pub fn fail_next(&self, verb: Verb, kind: impl Into<String>) {
		self.lock().faults.push((verb, kind.into()));
	}

	/// Number of watch streams that have not been dropped.
	pub fn active_watches(&self) -> usize {
		self.active_watches.load(Ordering::SeqCst)
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

fn kind_of<K: StoreObject>() -> String {
	format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn short_kind(kind: &str) -> &str {
	kind.rsplit('/').next().unwrap_or(kind)
}

fn now() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn metadata(value: &Value) -> Option<&Map<String, Value>> {
	value.get("metadata").and_then(Value::as_object)
}

fn metadata_mut(value: &mut Value) -> &mut Map<String, Value> {
	let meta = &mut value["metadata"];
	if !meta.is_object() {
		*meta = Value::Object(Map::new());
	}
	match meta {
		Value::Object(map) => map,
		_ => unreachable!("metadata was just replaced with an object"),
	}
}

fn meta_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
	metadata(value)
		.and_then(|m| m.get(field))
		.and_then(Value::as_str)
}

fn finalizers(value: &Value) -> Vec<String> {
	metadata(value)
		.and_then(|m| m.get("finalizers"))
		.and_then(Value::as_array)
		.map(|items| {
			items
				.iter()
				.filter_map(|f| f.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default()
}

fn set_finalizers(value: &mut Value, names: Vec<String>) {
	let meta = metadata_mut(value);
	if names.is_empty() {
		meta.remove("finalizers");
	} else {
		meta.insert(
			"finalizers".into(),
			Value::Array(names.into_iter().map(Value::from).collect()),
		);
	}
}

fn is_deleting(value: &Value) -> bool {
	meta_str(value, "deletionTimestamp").is_some()
}

fn owner_uids(value: &Value) -> Vec<String> {
	metadata(value)
		.and_then(|m| m.get("ownerReferences"))
		.and_then(Value::as_array)
		.map(|refs| {
			refs.iter()
				.filter_map(|r| r.get("uid").and_then(Value::as_str).map(str::to_string))
				.collect()
		})
		.unwrap_or_default()
}

/// Everything except identity bookkeeping and status.
fn desired_state(value: &Value) -> Value {
	let mut copy = value.clone();
	if let Value::Object(map) = &mut copy {
		map.remove("metadata");
		map.remove("status");
	}
	copy
}

/// RFC 7386 JSON merge patch.
fn merge_patch(target: &mut Value, patch: &Value) {
	match patch {
		Value::Object(entries) => {
			if !target.is_object() {
				*target = Value::Object(Map::new());
			}
			if let Value::Object(map) = target {
				for (key, value) in entries {
					if value.is_null() {
						map.remove(key);
					} else {
						merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
					}
				}
			}
		}
		other => *target = other.clone(),
	}
}

fn key_from_value<K: StoreObject>(value: &Value) -> K8sResult<ObjectKey> {
	let name = meta_str(value, "name")
		.filter(|n| !n.is_empty())
		.ok_or_else(|| K8sError::Invalid {
			message: format!("{}: metadata.name is required", K::kind_name()),
		})?;
	if !K::NAMESPACED {
		return Ok(ObjectKey::cluster(name));
	}
	let namespace = meta_str(value, "namespace")
		.filter(|n| !n.is_empty())
		.ok_or_else(|| K8sError::Invalid {
			message: format!("{}: metadata.namespace is required", K::kind_name()),
		})?;
	Ok(ObjectKey::namespaced(namespace, name))
}

fn conflict(kind: &str, key: &ObjectKey) -> K8sError {
	K8sError::Conflict {
		kind: short_kind(kind).to_string(),
		name: key.to_string(),
	}
}

fn not_found(kind: &str, key: &ObjectKey) -> K8sError {
	K8sError::NotFound {
		kind: short_kind(kind).to_string(),
		name: key.to_string(),
	}
}

impl State {
	fn bump_version(&mut self) -> u64 {
		let version = self.next_version;
		self.next_version += 1;
		version
	}

	fn take_fault(&mut self, verb: Verb, kind: &str) -> K8sResult<()> {
		let short = short_kind(kind);
		if let Some(index) = self
			.faults
			.iter()
			.position(|(v, k)| *v == verb && k == short)
		{
			self.faults.remove(index);
			return Err(K8sError::ApiError {
				message: format!("injected {verb:?} failure for {short}"),
			});
		}
		Ok(())
	}

	fn record(&mut self, verb: Verb, kind: &str, key: &ObjectKey) {
		self.journal.push(JournalEntry {
			verb,
			kind: short_kind(kind).to_string(),
			key: key.clone(),
		});
	}

	fn emit(&mut self, kind: &str, key: &ObjectKey, event_type: EventType, object: &Value) {
		let resource_version = meta_str(object, "resourceVersion")
			.and_then(|v| v.parse().ok())
			.unwrap_or_default();
		let event = Arc::new(StoredEvent {
			kind: kind.to_string(),
			key: key.clone(),
			resource_version,
			event_type,
			object: object.clone(),
		});
		if self.history.len() == HISTORY_CAPACITY {
			self.history.pop_front();
		}
		self.history.push_back(Arc::clone(&event));
		// No receivers is fine.
		let _ = self.events.send(event);
	}

	fn insert_new(&mut self, kind: String, key: ObjectKey, mut value: Value) -> Value {
		let version = self.bump_version();
		{
			let meta = metadata_mut(&mut value);
			meta.entry("uid")
				.or_insert_with(|| Value::from(uuid::Uuid::new_v4().to_string()));
			meta.insert("generation".into(), Value::from(1));
			meta.insert("resourceVersion".into(), Value::from(version.to_string()));
			meta.insert("creationTimestamp".into(), Value::from(now()));
			meta.remove("deletionTimestamp");
		}
		if let Value::Object(map) = &mut value {
			map.remove("status");
		}
		self.record(Verb::Create, &kind, &key);
		self.emit(&kind, &key, EventType::Added, &value);
		self.objects.insert((kind, key), value.clone());
		value
	}

	/// Begin deleting an object, honouring deletion guards.
	fn delete_slot(&mut self, kind: &str, key: &ObjectKey) {
		let slot = (kind.to_string(), key.clone());
		let Some(existing) = self.objects.get(&slot).cloned() else {
			return;
		};
		let guards = finalizers(&existing);
		if guards.is_empty() {
			self.remove_slot(kind, key);
			return;
		}

		if !is_deleting(&existing) {
			let version = self.bump_version();
			let mut marked = existing;
			{
				let meta = metadata_mut(&mut marked);
				meta.insert("deletionTimestamp".into(), Value::from(now()));
				meta.insert("resourceVersion".into(), Value::from(version.to_string()));
			}
			self.emit(kind, key, EventType::Modified, &marked);
			self.objects.insert(slot, marked.clone());

			if guards.iter().any(|g| g == FOREGROUND_DELETION) {
				if let Some(uid) = meta_str(&marked, "uid").map(str::to_string) {
					for (dep_kind, dep_key) in self.dependents_of(&uid) {
						self.delete_slot(&dep_kind, &dep_key);
					}
				}
			}
		}
	}

	/// Physically remove an object and cascade to its dependents.
	fn remove_slot(&mut self, kind: &str, key: &ObjectKey) {
		let Some(mut removed) = self.objects.remove(&(kind.to_string(), key.clone())) else {
			return;
		};
		let version = self.bump_version();
		metadata_mut(&mut removed).insert("resourceVersion".into(), Value::from(version.to_string()));
		trace!(kind = short_kind(kind), key = %key, "object removed");
		self.emit(kind, key, EventType::Deleted, &removed);

		if let Some(uid) = meta_str(&removed, "uid") {
			for (dep_kind, dep_key) in self.dependents_of(uid) {
				self.delete_slot(&dep_kind, &dep_key);
			}
		}

		if short_kind(kind) == "Namespace" {
			let contained: Vec<Slot> = self
				.objects
				.keys()
				.filter(|(_, k)| k.namespace.as_deref() == Some(key.name.as_str()))
				.cloned()
				.collect();
			for (dep_kind, dep_key) in contained {
				self.delete_slot(&dep_kind, &dep_key);
			}
		}

		self.settle_foreground();
	}

	fn dependents_of(&self, uid: &str) -> Vec<Slot> {
		self.objects
			.iter()
			.filter(|(_, value)| owner_uids(value).iter().any(|owner| owner == uid))
			.map(|(slot, _)| slot.clone())
			.collect()
	}

	/// Release foreground guards whose dependents are all gone.
	fn settle_foreground(&mut self) {
		loop {
			let ready: Option<Slot> = self
				.objects
				.iter()
				.find(|(_, value)| {
					is_deleting(value)
						&& finalizers(value).iter().any(|g| g == FOREGROUND_DELETION)
						&& meta_str(value, "uid")
							.map(|uid| self.dependents_of(uid).is_empty())
							.unwrap_or(true)
				})
				.map(|(slot, _)| slot.clone());

			let Some((kind, key)) = ready else {
				return;
			};
			let Some(mut value) = self.objects.get(&(kind.clone(), key.clone())).cloned() else {
				return;
			};
			let remaining: Vec<String> = finalizers(&value)
				.into_iter()
				.filter(|g| g != FOREGROUND_DELETION)
				.collect();
			if remaining.is_empty() {
				self.remove_slot(&kind, &key);
			} else {
				set_finalizers(&mut value, remaining);
				let version = self.bump_version();
				metadata_mut(&mut value).insert("resourceVersion".into(), Value::from(version.to_string()));
				self.emit(&kind, &key, EventType::Modified, &value);
				self.objects.insert((kind, key), value);
			}
		}
	}
}

struct TrackedStream<K> {
	inner: WatchStream<K>,
	active: Arc<AtomicUsize>,
}

impl<K> Stream for TrackedStream<K> {
	type Item = K8sResult<WatchEvent<K>>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.inner.as_mut().poll_next(cx)
	}
}

impl<K> Drop for TrackedStream<K> {
	fn drop(&mut self) {
		self.active.fetch_sub(1, Ordering::SeqCst);
	}
}

fn to_watch_event<K: StoreObject>(event: &StoredEvent) -> K8sResult<WatchEvent<K>> {
	let obj: K = serde_json::from_value(event.object.clone())?;
	Ok(match event.event_type {
		EventType::Added => WatchEvent::Added(obj),
		EventType::Modified => WatchEvent::Modified(obj),
		EventType::Deleted => WatchEvent::Deleted(obj),
	})
}

#[async_trait]
impl ResourceStore for InMemoryStore {
	async fn create<K: StoreObject>(&self, obj: &K) -> K8sResult<K> {
		let kind = kind_of::<K>();
		let value = serde_json::to_value(obj)?;
		let key = key_from_value::<K>(&value)?;

		let mut state = self.lock();
		state.take_fault(Verb::Create, &kind)?;

		if let Some(ns) = key.namespace() {
			let ns_slot = (kind_of::<Namespace>(), ObjectKey::cluster(ns));
			match state.objects.get(&ns_slot) {
				None => return Err(not_found(&ns_slot.0, &ns_slot.1)),
				Some(existing) if is_deleting(existing) => {
					return Err(K8sError::ApiError {
						message: format!("namespace {ns} is being terminated"),
					});
				}
				Some(_) => {}
			}
		}

		if state.objects.contains_key(&(kind.clone(), key.clone())) {
			return Err(K8sError::AlreadyExists {
				kind: short_kind(&kind).to_string(),
				name: key.to_string(),
			});
		}

		debug!(kind = short_kind(&kind), key = %key, "creating object");
		let stored = state.insert_new(kind, key, value);
		Ok(serde_json::from_value(stored)?)
	}

	async fn get<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<K> {
		let kind = kind_of::<K>();
		let state = self.lock();
		let value = state
			.objects
			.get(&(kind.clone(), key.clone()))
			.cloned()
			.ok_or_else(|| not_found(&kind, key))?;
		drop(state);
		Ok(serde_json::from_value(value)?)
	}

	async fn update<K: StoreObject>(&self, obj: &K) -> K8sResult<K> {
		let kind = kind_of::<K>();
		let mut value = serde_json::to_value(obj)?;
		let key = key_from_value::<K>(&value)?;

		let mut state = self.lock();
		state.take_fault(Verb::Update, &kind)?;
		let slot = (kind.clone(), key.clone());
		let existing = state
			.objects
			.get(&slot)
			.cloned()
			.ok_or_else(|| not_found(&kind, &key))?;

		if let Some(expected) = meta_str(&value, "resourceVersion") {
			if Some(expected) != meta_str(&existing, "resourceVersion") {
				return Err(conflict(&kind, &key));
			}
		}

		if is_deleting(&existing) {
			let current = finalizers(&existing);
			if finalizers(&value).iter().any(|f| !current.contains(f)) {
				return Err(K8sError::Invalid {
					message: format!(
						"{key}: no new finalizers can be added if the object is being deleted"
					),
				});
			}
		}

		let spec_changed = desired_state(&existing) != desired_state(&value);
		let generation = metadata(&existing)
			.and_then(|m| m.get("generation"))
			.and_then(Value::as_i64)
			.unwrap_or(1);
		let version = state.bump_version();
		{
			let existing_meta = metadata(&existing).cloned().unwrap_or_default();
			let meta = metadata_mut(&mut value);
			for field in ["uid", "creationTimestamp", "deletionTimestamp", "name", "namespace"] {
				match existing_meta.get(field) {
					Some(v) => meta.insert(field.into(), v.clone()),
					None => meta.remove(field),
				};
			}
			let generation = if spec_changed { generation + 1 } else { generation };
			meta.insert("generation".into(), Value::from(generation));
			meta.insert("resourceVersion".into(), Value::from(version.to_string()));
		}
		if let Value::Object(map) = &mut value {
			match existing.get("status") {
				Some(status) => map.insert("status".into(), status.clone()),
				None => map.remove("status"),
			};
		}

		state.record(Verb::Update, &kind, &key);
		if is_deleting(&value) && finalizers(&value).is_empty() {
			state.objects.insert(slot, value.clone());
			state.remove_slot(&kind, &key);
		} else {
			state.emit(&kind, &key, EventType::Modified, &value);
			state.objects.insert(slot, value.clone());
		}
		drop(state);
		Ok(serde_json::from_value(value)?)
	}

	async fn patch_status<K: StoreObject>(&self, obj: &K, status: Value) -> K8sResult<K> {
		let kind = kind_of::<K>();
		let requested = serde_json::to_value(obj)?;
		let key = key_from_value::<K>(&requested)?;

		let mut state = self.lock();
		state.take_fault(Verb::PatchStatus, &kind)?;
		let slot = (kind.clone(), key.clone());
		let mut value = state
			.objects
			.get(&slot)
			.cloned()
			.ok_or_else(|| not_found(&kind, &key))?;

		if let Some(expected) = meta_str(&requested, "resourceVersion") {
			if Some(expected) != meta_str(&value, "resourceVersion") {
				return Err(conflict(&kind, &key));
			}
		}

		if let Value::Object(map) = &mut value {
			let current = map.entry("status").or_insert(Value::Null);
			merge_patch(current, &status);
		}
		let version = state.bump_version();
		metadata_mut(&mut value).insert("resourceVersion".into(), Value::from(version.to_string()));

		state.record(Verb::PatchStatus, &kind, &key);
		state.emit(&kind, &key, EventType::Modified, &value);
		state.objects.insert(slot, value.clone());
		drop(state);
		Ok(serde_json::from_value(value)?)
	}

	async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<()> {
		let kind = kind_of::<K>();
		let mut state = self.lock();
		state.take_fault(Verb::Delete, &kind)?;
		if !state.objects.contains_key(&(kind.clone(), key.clone())) {
			return Err(not_found(&kind, key));
		}
		state.record(Verb::Delete, &kind, key);
		state.delete_slot(&kind, key);
		state.settle_foreground();
		Ok(())
	}

	async fn list<K: StoreObject>(
		&self,
		namespace: Option<&str>,
		filter: &FieldFilter,
	) -> K8sResult<Vec<K>> {
		let kind = kind_of::<K>();
		let values: Vec<Value> = {
			let state = self.lock();
			state
				.objects
				.iter()
				.filter(|((k, key), _)| {
					*k == kind && namespace.map_or(true, |ns| key.namespace() == Some(ns))
				})
				.filter(|(_, value)| filter.matches(value))
				.map(|(_, value)| value.clone())
				.collect()
		};
		values
			.into_iter()
			.map(|v| serde_json::from_value(v).map_err(K8sError::from))
			.collect()
	}

	async fn watch<K: StoreObject>(
		&self,
		key: &ObjectKey,
		since: Option<String>,
	) -> K8sResult<WatchStream<K>> {
		let kind = kind_of::<K>();
		let since = since.and_then(|v| v.parse::<u64>().ok());

		let (backlog, receiver) = {
			let state = self.lock();
			let receiver = state.events.subscribe();
			let backlog: Vec<Arc<StoredEvent>> = match since {
				Some(version) => state
					.history
					.iter()
					.filter(|e| e.resource_version > version)
					.cloned()
					.collect(),
				None => Vec::new(),
			};
			(backlog, receiver)
		};

		let wanted_kind = kind.clone();
		let wanted_key = key.clone();
		let live = BroadcastStream::new(receiver).map(|item| {
			item.map_err(|e| K8sError::Watch {
				message: e.to_string(),
			})
		});
		let events = futures::stream::iter(backlog.into_iter().map(Ok::<_, K8sError>))
			.chain(live)
			.filter_map(move |item| {
				let relevant = match &item {
					Ok(event) => event.kind == wanted_kind && event.key == wanted_key,
					Err(_) => true,
				};
				let out = if relevant {
					Some(item.and_then(|event| to_watch_event::<K>(&event)))
				} else {
					None
				};
				futures::future::ready(out)
			});

		self.active_watches.fetch_add(1, Ordering::SeqCst);
		Ok(Box::pin(TrackedStream {
			inner: Box::pin(events),
			active: Arc::clone(&self.active_watches),
		}))
	}
}
