use std::collections::BTreeMap;
use std::rc::Rc;
use derivative::Derivative;
use crate::host::{HostRef, HostTree};
use crate::runtime::RxRuntime;
use crate::store::Observable;

/// A live element's attributes as an observable record, kept up to date by the host.
///
/// Each attribute is a field named after it. A removed attribute stays in the record as `None`.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct AttributeRecord<H: HostTree> {
    record: Observable<BTreeMap<String, Option<String>>>,
    element: HostRef<H>
}

/// Snapshot `element`'s attributes and keep following their changes.
pub fn watch_attributes<H: HostTree>(runtime: &RxRuntime, host: &H, element: &H::Node) -> AttributeRecord<H> {
    let snapshot = host.attribute_names(element)
        .into_iter()
        .map(|name| {
            let value = host.attribute(element, &name);
            (name, value)
        })
        .collect::<BTreeMap<_, _>>();
    log::trace!("watching {} attributes of {:?}", snapshot.len(), host.key(element));
    let record = runtime.watch(snapshot);
    host.observe_attributes(element, {
        let record = record.clone();
        Rc::new(move |name: &str, value: Option<&str>| {
            record.update(name.to_string(), |attributes| {
                attributes.insert(name.to_string(), value.map(str::to_string));
            });
        })
    });
    AttributeRecord {
        record,
        element: HostRef::new(host, element)
    }
}

impl<H: HostTree> AttributeRecord<H> {
    /// The attribute's value, subscribing to it. Attributes the record hasn't seen are read from
    /// the element.
    pub fn attr(&self, name: &str) -> Option<String> {
        let seen = self.record.with(name.to_string(), |attributes| attributes.get(name).cloned());
        match seen {
            Some(value) => value,
            None => self.element.resolve().and_then(|element| self.host_attribute(&element, name))
        }
    }

    /// Whether the attribute is present, subscribing to it.
    pub fn has(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn record(&self) -> &Observable<BTreeMap<String, Option<String>>> {
        &self.record
    }

    fn host_attribute(&self, element: &H::Node, name: &str) -> Option<String> {
        self.element.host().attribute(element, name)
    }
}
