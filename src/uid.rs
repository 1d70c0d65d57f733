use std::cell::Cell;
use std::thread_local;

/// Identity of an observable record, used to key its row in the subscription table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RecordUid(u64);

/// Identity of an effect. Also the order effects were created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EffectUid(u64);

thread_local! {
    static RECORD_UID: Cell<u64> = Cell::new(0);
    static EFFECT_UID: Cell<u64> = Cell::new(0);
}

fn bump(cell: &'static std::thread::LocalKey<Cell<u64>>) -> u64 {
    cell.with(|uid_cell| {
        let uid = uid_cell.get() + 1;
        uid_cell.set(uid);
        uid
    })
}

impl RecordUid {
    pub(crate) fn next() -> RecordUid {
        RecordUid(bump(&RECORD_UID))
    }
}

impl EffectUid {
    pub(crate) fn next() -> EffectUid {
        EffectUid(bump(&EFFECT_UID))
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_unique_and_increasing() {
        let a = RecordUid::next();
        let b = RecordUid::next();
        assert!(a < b);
        let c = EffectUid::next();
        let d = EffectUid::next();
        assert_ne!(c, d);
    }
}
