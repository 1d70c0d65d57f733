use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::ops::{Bound, Range, RangeBounds};
use std::rc::Rc;
use derivative::Derivative;
use crate::runtime::{RxRuntime, WeakRuntime};
use crate::uid::RecordUid;

/// Which part of a record a read or write touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// A named field of a record
    Name(Cow<'static, str>),
    /// A position in a collection
    Index(usize),
    /// The length of a collection
    Len
}

/// A record whose field reads and writes are tracked.
///
/// Reading a field while an effect runs subscribes the effect to `(record, field)`.
/// Writing a field queues its subscribers, clears the subscriber set, then performs the write.
/// Writing always notifies, even when the new value equals the old one; use
/// [Field::set_if_changed] to skip equal writes.
///
/// The handle is cheap to clone and clones refer to the same record. If the runtime the record was
/// created in is dropped, reads and writes keep working but are no longer tracked.
///
/// Don't write to a record from inside the closure of one of its own reads.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Observable<T>(Rc<ObservableInner<T>>);

struct ObservableInner<T> {
    uid: RecordUid,
    value: RefCell<T>,
    runtime: WeakRuntime
}

/// View and mutate one named field of an [Observable].
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct Field<T, U> {
    #[derivative(Debug = "ignore")]
    record: Observable<T>,
    name: &'static str,
    #[derivative(Debug = "ignore")]
    get: fn(&T) -> &U,
    #[derivative(Debug = "ignore")]
    get_mut: fn(&mut T) -> &mut U
}

/// An observable vector. Its fields are its positions ([FieldKey::Index]) and its length ([FieldKey::Len]).
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct RxVec<T>(Observable<Vec<T>>);

/// Build a [Field] for a named struct field: `field!(record.count)`.
#[macro_export]
macro_rules! field {
    ($record:ident . $name:ident) => {
        $record.field(stringify!($name), |record| &record.$name, |record| &mut record.$name)
    };
    ($record:expr, $name:ident) => {
        $record.field(stringify!($name), |record| &record.$name, |record| &mut record.$name)
    };
}

impl<T: 'static> Observable<T> {
    pub fn new(runtime: &RxRuntime, value: T) -> Self {
        Observable(Rc::new(ObservableInner {
            uid: RecordUid::next(),
            value: RefCell::new(value),
            runtime: runtime.downgrade()
        }))
    }

    /// Read through `read`, subscribing the current computation to `key`.
    pub fn with<U>(&self, key: impl Into<FieldKey>, read: impl FnOnce(&T) -> U) -> U {
        self.track(&key.into());
        read(&self.0.value.borrow())
    }

    /// Read without subscribing anything.
    pub fn untracked<U>(&self, read: impl FnOnce(&T) -> U) -> U {
        read(&self.0.value.borrow())
    }

    /// Write through `write`, notifying the subscribers of `key` first.
    pub fn update<U>(&self, key: impl Into<FieldKey>, write: impl FnOnce(&mut T) -> U) -> U {
        self.update_fields(&[key.into()], write)
    }

    /// Write several fields at once, notifying the subscribers of all of them first.
    pub fn update_fields<U>(&self, keys: &[FieldKey], write: impl FnOnce(&mut T) -> U) -> U {
        if let Some(runtime) = self.0.runtime.upgrade() {
            runtime.notify(self.0.uid, keys);
        }
        write(&mut self.0.value.borrow_mut())
    }

    /// Create a view of one named field.
    pub fn field<U>(&self, name: &'static str, get: fn(&T) -> &U, get_mut: fn(&mut T) -> &mut U) -> Field<T, U> {
        Field {
            record: self.clone(),
            name,
            get,
            get_mut
        }
    }

    /// Whether the runtime this record was created in is still alive.
    pub fn is_watched(&self) -> bool {
        self.0.runtime.upgrade().is_some()
    }

    pub fn ptr_eq(&self, other: &Observable<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[cfg(test)]
    pub(crate) fn uid(&self) -> RecordUid {
        self.0.uid
    }

    fn track(&self, key: &FieldKey) {
        if let Some(runtime) = self.0.runtime.upgrade() {
            runtime.track(self.0.uid, key);
        }
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Clone the whole record, subscribing to `key`.
    pub fn get(&self, key: impl Into<FieldKey>) -> T {
        self.with(key, T::clone)
    }
}

impl<T> Drop for ObservableInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.forget_record(self.uid);
        }
    }
}

/// Records compare by identity.
impl<T> PartialEq for Observable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Debug> Debug for Observable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => f.debug_struct("Observable")
                .field("uid", &self.0.uid)
                .field("value", &*value)
                .finish(),
            Err(_) => f.debug_struct("Observable")
                .field("uid", &self.0.uid)
                .finish_non_exhaustive()
        }
    }
}

impl<T: 'static, U> Field<T, U> {
    /// Read the field through `read`.
    pub fn with<R>(&self, read: impl FnOnce(&U) -> R) -> R {
        let get = self.get;
        self.record.with(self.name, |record| read(get(record)))
    }

    /// Write the field. Always notifies.
    pub fn set(&self, value: U) {
        let get_mut = self.get_mut;
        self.record.update(self.name, |record| *get_mut(record) = value);
    }

    /// Modify the field in place. Always notifies.
    pub fn update<R>(&self, modify: impl FnOnce(&mut U) -> R) -> R {
        let get_mut = self.get_mut;
        self.record.update(self.name, |record| modify(get_mut(record)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn record(&self) -> &Observable<T> {
        &self.record
    }
}

impl<T: 'static, U: Clone> Field<T, U> {
    /// Clone the field's value.
    pub fn get(&self) -> U {
        self.with(U::clone)
    }
}

impl<T: 'static, U: PartialEq> Field<T, U> {
    /// Write the field only if `value` differs from the current one. Returns whether it wrote.
    pub fn set_if_changed(&self, value: U) -> bool {
        let get = self.get;
        if self.record.untracked(|record| get(record) == &value) {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: 'static> RxVec<T> {
    pub fn new(runtime: &RxRuntime, items: Vec<T>) -> Self {
        RxVec(Observable::new(runtime, items))
    }

    /// Length, subscribing to [FieldKey::Len].
    pub fn len(&self) -> usize {
        self.0.with(FieldKey::Len, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the item at `index`, subscribing to that position.
    pub fn with<U>(&self, index: usize, read: impl FnOnce(&T) -> U) -> Option<U> {
        self.0.with(FieldKey::Index(index), |items| items.get(index).map(read))
    }

    pub fn untracked<U>(&self, read: impl FnOnce(&[T]) -> U) -> U {
        self.0.untracked(|items| read(items))
    }

    /// Append, notifying the new position and the length.
    pub fn push(&self, item: T) {
        let len = self.untracked_len();
        self.0.update_fields(&[FieldKey::Index(len), FieldKey::Len], |items| items.push(item));
    }

    pub fn pop(&self) -> Option<T> {
        let len = self.untracked_len();
        if len == 0 {
            return None;
        }
        self.0.update_fields(&[FieldKey::Index(len - 1), FieldKey::Len], Vec::pop)
    }

    /// Replace the item at `index`, notifying only that position. Returns the old item.
    ///
    /// **Panics** if `index` is out of bounds.
    pub fn set(&self, index: usize, item: T) -> T {
        self.0.update(FieldKey::Index(index), |items| std::mem::replace(&mut items[index], item))
    }

    /// **Panics** if `index > len`.
    pub fn insert(&self, index: usize, item: T) {
        let len = self.untracked_len();
        self.0.update_fields(&shifted_keys(index..len + 1, true), |items| items.insert(index, item));
    }

    /// **Panics** if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> T {
        let len = self.untracked_len();
        self.0.update_fields(&shifted_keys(index..len, true), |items| items.remove(index))
    }

    /// Replace `range` with `replace_with`, notifying every position from the start of the range
    /// to the end of the longer of the old and new vectors, and the length if it changes.
    pub fn splice(&self, range: impl RangeBounds<usize>, replace_with: impl IntoIterator<Item=T>) -> Vec<T> {
        let len = self.untracked_len();
        let range = resolve_range(range, len);
        let replace_with = replace_with.into_iter().collect::<Vec<_>>();
        let new_len = len - range.len() + replace_with.len();
        let keys = shifted_keys(range.start..len.max(new_len), new_len != len);
        self.0.update_fields(&keys, |items| items.splice(range, replace_with).collect())
    }

    /// **Panics** if either index is out of bounds.
    pub fn swap(&self, a: usize, b: usize) {
        self.0.update_fields(&[FieldKey::Index(a), FieldKey::Index(b)], |items| items.swap(a, b));
    }

    /// Keep only the items for which `keep` holds, notifying the positions from the first dropped
    /// item on, and the length if it changes. `keep` runs once per item, before anything is written.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        let kept = self.0.untracked(|items| items.iter().map(|item| keep(item)).collect::<Vec<_>>());
        let Some(first_dropped) = kept.iter().position(|kept| !kept) else { return };
        let keys = shifted_keys(first_dropped..kept.len(), true);
        let mut kept = kept.into_iter();
        self.0.update_fields(&keys, |items| items.retain(|_| kept.next().unwrap_or(true)));
    }

    pub fn clear(&self) {
        let len = self.untracked_len();
        self.0.update_fields(&shifted_keys(0..len, len > 0), Vec::clear);
    }

    pub fn ptr_eq(&self, other: &RxVec<T>) -> bool {
        self.0.ptr_eq(&other.0)
    }

    fn untracked_len(&self) -> usize {
        self.0.untracked(Vec::len)
    }
}

impl<T: Clone + 'static> RxVec<T> {
    /// Clone the item at `index`, subscribing to that position.
    pub fn get(&self, index: usize) -> Option<T> {
        self.with(index, T::clone)
    }

    /// Clone every item, subscribing to the length and every position.
    pub fn to_vec(&self) -> Vec<T> {
        let len = self.len();
        (0..len).filter_map(|index| self.get(index)).collect()
    }
}

impl<T> PartialEq for RxVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Debug> Debug for RxVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RxVec").field(&self.0).finish()
    }
}

impl From<&'static str> for FieldKey {
    fn from(name: &'static str) -> Self {
        FieldKey::Name(Cow::Borrowed(name))
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        FieldKey::Name(Cow::Owned(name))
    }
}

impl From<usize> for FieldKey {
    fn from(index: usize) -> Self {
        FieldKey::Index(index)
    }
}

/// Positions in `range`, plus the length if it changes.
fn shifted_keys(range: Range<usize>, len_changes: bool) -> Vec<FieldKey> {
    range.map(FieldKey::Index).chain(len_changes.then_some(FieldKey::Len)).collect()
}

fn resolve_range(range: impl RangeBounds<usize>, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start + 1,
        Bound::Unbounded => 0
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end + 1,
        Bound::Excluded(&end) => end,
        Bound::Unbounded => len
    };
    start.min(len)..end.min(len).max(start.min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_range_clamps() {
        assert_eq!(resolve_range(.., 4), 0..4);
        assert_eq!(resolve_range(1..=2, 4), 1..3);
        assert_eq!(resolve_range(2..10, 4), 2..4);
        assert_eq!(resolve_range(6.., 4), 4..4);
    }

    #[test]
    fn shifted_keys_include_len_only_when_it_changes() {
        assert_eq!(shifted_keys(1..3, true), vec![FieldKey::Index(1), FieldKey::Index(2), FieldKey::Len]);
        assert_eq!(shifted_keys(0..2, false), vec![FieldKey::Index(0), FieldKey::Index(1)]);
    }
}
