use mini_rx_dom::*;
use test_log::test;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
struct Pair {
    a: i32,
    b: i32
}

fn counter() -> (Rc<Cell<usize>>, impl Fn()) {
    let runs = Rc::new(Cell::new(0));
    let bump = {
        let runs = runs.clone();
        move || runs.set(runs.get() + 1)
    };
    (runs, bump)
}

#[test]
fn effects_only_rerun_for_fields_they_read() {
    let rt = RxRuntime::new();
    let pair = rt.watch(Pair { a: 1, b: 2 });
    let (runs, bump) = counter();
    let _effect = rt.run_immediate({
        let pair = pair.clone();
        move || {
            pair.with("a", |pair| pair.a);
            bump();
        }
    });
    assert_eq!(runs.get(), 1);

    pair.update("b", |pair| pair.b = 5);
    assert!(!rt.is_scheduled());
    rt.recompute();
    assert_eq!(runs.get(), 1);

    pair.update("a", |pair| pair.a = 5);
    assert_eq!(rt.pending(), 1);
    rt.recompute();
    assert_eq!(runs.get(), 2);
}

#[test]
fn field_lenses() {
    let rt = RxRuntime::new();
    let pair = rt.watch(Pair { a: 1, b: 2 });
    let a = field!(pair.a);
    let b = field!(pair, b);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let _effect = rt.run_immediate({
        let (a, seen) = (a.clone(), seen.clone());
        move || seen.borrow_mut().push(a.get())
    });
    b.set(10);
    rt.recompute();
    a.update(|a| *a += 1);
    rt.recompute();
    assert_eq!(*seen.borrow(), vec![1, 2]);
    assert_eq!(pair.untracked(Pair::clone), Pair { a: 2, b: 10 });
    assert_eq!(a.name(), "a");
}

#[test]
fn writes_in_one_turn_rerun_once_with_the_final_value() {
    let rt = RxRuntime::new();
    let state = rt.watch(0);
    let sink = Rc::new(RefCell::new(Vec::new()));
    let _effect = rt.run_immediate({
        let (state, sink) = (state.clone(), sink.clone());
        move || {
            let count = state.get("count");
            sink.borrow_mut().push(count);
        }
    });
    for _ in 0..3 {
        state.update("count", |count| *count = 1);
    }
    assert_eq!(rt.pending(), 1);
    rt.recompute();
    assert_eq!(*sink.borrow(), vec![0, 1]);
}

#[test]
fn equal_writes_still_notify() {
    let rt = RxRuntime::new();
    let pair = rt.watch(Pair { a: 1, b: 2 });
    let a = field!(pair.a);
    let (runs, bump) = counter();
    let _effect = rt.run_immediate({
        let a = a.clone();
        move || {
            a.get();
            bump();
        }
    });

    a.set(1);
    rt.recompute();
    assert_eq!(runs.get(), 2);

    assert!(!a.set_if_changed(1));
    assert!(!rt.is_scheduled());
    assert!(a.set_if_changed(3));
    rt.recompute();
    assert_eq!(runs.get(), 3);
}

#[test]
fn dependencies_follow_control_flow() {
    let rt = RxRuntime::new();
    let flag = rt.watch(true);
    let pair = rt.watch(Pair { a: 0, b: 0 });
    let (runs, bump) = counter();
    let effect = rt.run_immediate({
        let (flag, pair) = (flag.clone(), pair.clone());
        move || {
            if flag.get("flag") {
                pair.with("a", |_| ());
            } else {
                pair.with("b", |_| ());
            }
            bump();
        }
    });
    flag.update("flag", |flag| *flag = false);
    rt.recompute();
    assert_eq!(runs.get(), 2);
    assert_eq!(effect.dependency_count(), 2);

    // No longer read
    pair.update("a", |pair| pair.a = 1);
    assert!(!rt.is_scheduled());
    pair.update("b", |pair| pair.b = 1);
    rt.recompute();
    assert_eq!(runs.get(), 3);
}

#[test]
fn untracked_reads_and_stopped_effects() {
    let rt = RxRuntime::new();
    let pair = rt.watch(Pair { a: 0, b: 0 });
    let (runs, bump) = counter();
    let effect = rt.run_immediate({
        let (rt, pair) = (rt.clone(), pair.clone());
        move || {
            rt.untracked(|| pair.with("a", |_| ()));
            pair.with("b", |_| ());
            bump();
        }
    });
    pair.update("a", |pair| pair.a = 1);
    assert!(!rt.is_scheduled());

    rt.stop(&effect);
    assert!(effect.is_stopped());
    pair.update("b", |pair| pair.b = 1);
    rt.recompute();
    assert_eq!(runs.get(), 1);
}

#[test]
fn writes_from_effects_join_the_same_drain() {
    let rt = RxRuntime::new();
    let source = rt.watch(0);
    let derived = rt.watch(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let _copy = rt.run_immediate({
        let (source, derived) = (source.clone(), derived.clone());
        move || {
            let value = source.get("value");
            derived.update("value", |derived| *derived = value * 10);
        }
    });
    let _sink = rt.run_immediate({
        let (derived, seen) = (derived.clone(), seen.clone());
        move || seen.borrow_mut().push(derived.get("value"))
    });

    source.update("value", |value| *value = 2);
    rt.recompute();
    assert!(!rt.is_scheduled());
    assert_eq!(*seen.borrow(), vec![0, 20]);
}

#[test]
fn effects_which_retrigger_themselves_are_carried_to_the_next_drain() {
    let rt = RxRuntime::with_config(RuntimeConfig { max_settle_drains: 5 });
    let count = rt.watch(0);
    let _effect = rt.run_immediate({
        let count = count.clone();
        move || {
            let value = count.get("count");
            if value < 3 {
                count.update("count", |count| *count = value + 1);
            }
        }
    });
    // The initial run already wrote once
    assert_eq!(count.untracked(|count| *count), 1);
    rt.recompute();
    assert_eq!(count.untracked(|count| *count), 2);
    assert!(rt.is_scheduled());
    assert_eq!(rt.recompute_until_settled(), Ok(2));
    assert_eq!(count.untracked(|count| *count), 3);
}

#[test]
fn endless_loops_are_reported() {
    let rt = RxRuntime::with_config(RuntimeConfig { max_settle_drains: 4 });
    let count = rt.watch(0u64);
    let _effect = rt.run_immediate({
        let count = count.clone();
        move || {
            let value = count.get("count");
            count.update("count", |count| *count = value + 1);
        }
    });
    assert_eq!(rt.recompute_until_settled(), Err(RuntimeError::Unsettled(4)));
}

#[test]
fn a_panicking_effect_does_not_stop_the_drain() {
    let rt = RxRuntime::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    rt.set_error_handler({
        let errors = errors.clone();
        move |error: &EffectError| errors.borrow_mut().push(error.message.clone())
    });
    let trigger = rt.watch(0);
    let (runs, bump) = counter();
    let _bad = rt.run_immediate({
        let trigger = trigger.clone();
        move || {
            if trigger.get("value") > 0 {
                panic!("bad effect");
            }
        }
    });
    let _good = rt.run_immediate({
        let trigger = trigger.clone();
        move || {
            trigger.get("value");
            bump();
        }
    });

    trigger.update("value", |value| *value = 1);
    rt.recompute();
    assert_eq!(runs.get(), 2);
    assert_eq!(*errors.borrow(), vec!["bad effect".to_string()]);
    assert!(!rt.is_scheduled());
}

#[test]
fn a_panicking_error_handler_does_not_stop_the_drain() {
    let rt = RxRuntime::new();
    rt.set_error_handler(|error: &EffectError| panic!("handler rethrew {}", error));
    let trigger = rt.watch(0);
    let (runs, bump) = counter();
    let _bad = rt.run_immediate({
        let trigger = trigger.clone();
        move || {
            if trigger.get("value") > 0 {
                panic!("bad effect");
            }
        }
    });
    let _good = rt.run_immediate({
        let trigger = trigger.clone();
        move || {
            trigger.get("value");
            bump();
        }
    });

    trigger.update("value", |value| *value = 1);
    rt.recompute();
    assert_eq!(runs.get(), 2);
    assert!(!rt.is_scheduled());

    let errors = Rc::new(RefCell::new(Vec::new()));
    rt.set_error_handler({
        let errors = errors.clone();
        move |error: &EffectError| errors.borrow_mut().push(error.message.clone())
    });
    trigger.update("value", |value| *value = 2);
    rt.recompute();
    assert_eq!(runs.get(), 3);
    assert_eq!(*errors.borrow(), vec!["bad effect".to_string()]);
}

#[test]
fn effects_run_in_the_order_they_were_notified() {
    let rt = RxRuntime::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let records = ["x", "y", "z"].map(|name| (name, rt.watch(0)));
    let _effects = records.iter().map(|(name, record)| {
        let (name, record, log) = (*name, record.clone(), log.clone());
        rt.run_immediate(move || {
            record.get("value");
            log.borrow_mut().push(name);
        })
    }).collect::<Vec<_>>();
    log.borrow_mut().clear();

    for index in [2, 0, 1] {
        records[index].1.update("value", |value| *value += 1);
    }
    assert_eq!(rt.pending(), 3);
    rt.recompute();
    assert_eq!(*log.borrow(), vec!["z", "x", "y"]);
}

#[test]
fn mutation_effects_skip_once_their_target_is_gone() {
    let rt = RxRuntime::new();
    let value = rt.watch(1);
    let target = Rc::new(RefCell::new(Vec::new()));
    let effect = rt.mutation_effect(Rc::downgrade(&target), {
        let value = value.clone();
        move |target: Rc<RefCell<Vec<i32>>>| target.borrow_mut().push(value.get("value"))
    });
    assert_eq!(effect.kind(), EffectKind::Mutation);
    value.update("value", |value| *value = 2);
    rt.recompute();
    assert_eq!(*target.borrow(), vec![1, 2]);

    let weak = Rc::downgrade(&target);
    drop(target);
    value.update("value", |value| *value = 3);
    rt.recompute();
    assert!(weak.upgrade().is_none());
    // The skipped run read nothing
    assert_eq!(effect.dependency_count(), 0);
    value.update("value", |value| *value = 4);
    assert!(!rt.is_scheduled());
}

#[test]
fn scheduled_effects_wait_for_the_drain() {
    let rt = RxRuntime::new();
    let hook_calls = Rc::new(Cell::new(0));
    rt.set_scheduler({
        let hook_calls = hook_calls.clone();
        move || hook_calls.set(hook_calls.get() + 1)
    });
    let (runs, bump) = counter();
    let _effect = rt.schedule(bump);
    assert_eq!(runs.get(), 0);
    assert_eq!(hook_calls.get(), 1);
    rt.recompute();
    assert_eq!(runs.get(), 1);
}

#[test]
fn vectors_track_positions_and_length() {
    let rt = RxRuntime::new();
    let items = rt.watch_vec(vec!["a", "b"]);
    let (len_runs, bump_len) = counter();
    let (first_runs, bump_first) = counter();
    let _len = rt.run_immediate({
        let items = items.clone();
        move || {
            items.len();
            bump_len();
        }
    });
    let _first = rt.run_immediate({
        let items = items.clone();
        move || {
            items.get(0);
            bump_first();
        }
    });

    items.set(1, "c");
    rt.recompute();
    assert_eq!((len_runs.get(), first_runs.get()), (1, 1));

    items.push("d");
    rt.recompute();
    assert_eq!((len_runs.get(), first_runs.get()), (2, 1));

    items.insert(0, "z");
    rt.recompute();
    assert_eq!((len_runs.get(), first_runs.get()), (3, 2));
    assert_eq!(items.untracked(|items| items.to_vec()), vec!["z", "a", "c", "d"]);

    let removed = items.splice(1..3, ["x"]);
    assert_eq!(removed, vec!["a", "c"]);
    assert_eq!(items.untracked(|items| items.to_vec()), vec!["z", "x", "d"]);
}

#[test]
fn records_outlive_their_runtime_as_plain_values() {
    let rt = RxRuntime::new();
    let pair = rt.watch(Pair { a: 1, b: 2 });
    assert!(pair.is_watched());
    drop(rt);
    assert!(!pair.is_watched());
    pair.update("a", |pair| pair.a = 7);
    assert_eq!(pair.get("a"), Pair { a: 7, b: 2 });
}

#[test]
fn length_is_only_notified_when_it_changes() {
    let rt = RxRuntime::new();
    let items = rt.watch_vec(vec!["a", "b", "c"]);
    let (runs, bump) = counter();
    let _len = rt.run_immediate({
        let items = items.clone();
        move || {
            items.len();
            bump();
        }
    });

    items.splice(.., ["c", "a", "b"]);
    items.swap(0, 2);
    items.retain(|_| true);
    assert!(!rt.is_scheduled());

    items.retain(|item| *item != "a");
    rt.recompute();
    assert_eq!(runs.get(), 2);
    assert_eq!(items.to_vec(), vec!["b", "c"]);

    items.clear();
    rt.recompute();
    assert_eq!(runs.get(), 3);
    items.clear();
    assert!(!rt.is_scheduled());
}
