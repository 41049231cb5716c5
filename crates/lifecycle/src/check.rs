//! Check predicates and their composition
//!
//! A check is a pure function of the recorded state and live-query
//! capability. Composed checks run their leaves in declaration order and
//! stop at the first failure.

use crate::accessor::LiveStateAccessor;
use crate::error::{CheckFailure, FetchError};
use crate::types::{LiveResource, RecordedState, ResourceRecord};
use std::fmt;
use std::sync::Arc;

/// Signature of a leaf predicate
pub type CheckFn =
    dyn Fn(&RecordedState, &LiveStateAccessor<'_>) -> Result<(), CheckFailure> + Send + Sync;

/// A verification over recorded and live state
#[derive(Clone)]
pub struct Check {
    name: String,
    body: Body,
}

#[derive(Clone)]
enum Body {
    Leaf(Arc<CheckFn>),
    All(Vec<Check>),
}

impl Check {
    /// Create a leaf check from a closure
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RecordedState, &LiveStateAccessor<'_>) -> Result<(), CheckFailure>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Leaf(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the leaf predicates in evaluation order
    pub fn leaf_names(&self) -> Vec<&str> {
        match &self.body {
            Body::Leaf(_) => vec![self.name.as_str()],
            Body::All(children) => children.iter().flat_map(Check::leaf_names).collect(),
        }
    }

    /// Evaluate the check, returning the first failing leaf's failure
    pub fn evaluate(
        &self,
        state: &RecordedState,
        live: &LiveStateAccessor<'_>,
    ) -> Result<(), CheckFailure> {
        match &self.body {
            Body::Leaf(f) => {
                log::debug!("check {}", self.name);
                f(state, live)
            }
            Body::All(children) => children
                .iter()
                .try_for_each(|child| child.evaluate(state, live)),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("leaves", &self.leaf_names())
            .finish()
    }
}

/// Compose checks into one that runs them in order, failing fast
///
/// Nested compositions are flattened, so composing `[a, b]` and then
/// `[that, c]` yields the same leaves as composing `[a, b, c]`.
pub fn compose<I>(checks: I) -> Check
where
    I: IntoIterator<Item = Check>,
{
    let mut leaves = Vec::new();
    for check in checks {
        match check.body {
            Body::All(children) => leaves.extend(children),
            body @ Body::Leaf(_) => leaves.push(Check {
                name: check.name,
                body,
            }),
        }
    }

    let name = if leaves.is_empty() {
        "all()".to_string()
    } else {
        format!("all({})", leaves.len())
    };

    Check {
        name,
        body: Body::All(leaves),
    }
}

fn recorded<'s>(
    state: &'s RecordedState,
    predicate: &str,
    address: &str,
) -> Result<&'s ResourceRecord, CheckFailure> {
    state
        .get(address)
        .ok_or_else(|| CheckFailure::new(predicate, format!("{address} not found in state")))
}

fn fetch_live(
    live: &LiveStateAccessor<'_>,
    predicate: &str,
    address: &str,
    record: &ResourceRecord,
) -> Result<LiveResource, CheckFailure> {
    if record.id.is_empty() {
        return Err(CheckFailure::new(predicate, format!("{address} has no id set")));
    }

    match live.fetch_with_retry(&record.kind, &record.id) {
        Ok(Some(resource)) => Ok(resource),
        Ok(None) => Err(CheckFailure::new(
            predicate,
            format!("{address}: no live resource with id {:?}", record.id),
        )),
        Err(FetchError::Provider(e)) => Err(CheckFailure::new(
            predicate,
            format!("{address}: provider error {} ({})", e.code, e.message),
        )),
        Err(e) => Err(CheckFailure::new(predicate, format!("{address}: {e}"))),
    }
}

/// The resource is recorded with an ID and exists remotely under that ID
pub fn resource_exists(address: impl Into<String>) -> Check {
    let address = address.into();
    let name = format!("exists({address})");
    let predicate = name.clone();

    Check::new(name, move |state, live| {
        let record = recorded(state, &predicate, &address)?;
        fetch_live(live, &predicate, &address, record).map(|_| ())
    })
}

/// A recorded attribute equals the expected value
pub fn attr_equals(
    address: impl Into<String>,
    key: impl Into<String>,
    expected: impl Into<String>,
) -> Check {
    let address = address.into();
    let key = key.into();
    let expected = expected.into();
    let name = format!("attr({address}.{key})");
    let predicate = name.clone();

    Check::new(name, move |state, _live| {
        let record = recorded(state, &predicate, &address)?;
        match record.attributes.get(&key) {
            Some(observed) if *observed == expected => Ok(()),
            observed => Err(CheckFailure::mismatch(
                predicate.as_str(),
                &key,
                &expected,
                observed.map(String::as_str),
            )),
        }
    })
}

/// A live-fetched attribute equals the expected value
pub fn live_attr_equals(
    address: impl Into<String>,
    key: impl Into<String>,
    expected: impl Into<String>,
) -> Check {
    let address = address.into();
    let key = key.into();
    let expected = expected.into();
    let name = format!("live_attr({address}.{key})");
    let predicate = name.clone();

    Check::new(name, move |state, live| {
        let record = recorded(state, &predicate, &address)?;
        let resource = fetch_live(live, &predicate, &address, record)?;
        match resource.attributes.get(&key) {
            Some(observed) if *observed == expected => Ok(()),
            observed => Err(CheckFailure::mismatch(
                predicate.as_str(),
                &key,
                &expected,
                observed.map(String::as_str),
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderContext;
    use crate::types::{Attributes, ResourceRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state() -> RecordedState {
        let mut attributes = Attributes::new();
        attributes.insert("image_id".into(), "ami-fb8e9292".into());
        attributes.insert("instance_type".into(), "t1.micro".into());

        let mut state = RecordedState::new();
        state.insert(
            "aws_launch_configuration.bar",
            ResourceRecord::new("aws_launch_configuration", "foobar-terraform-test", attributes),
        );
        state
    }

    fn pass(name: &str) -> Check {
        Check::new(name, |_, _| Ok(()))
    }

    fn fail(name: &'static str) -> Check {
        Check::new(name, move |_, _| Err(CheckFailure::new(name, "nope")))
    }

    #[test]
    fn test_compose_all_pass() {
        let ctx = ProviderContext::default();
        let check = compose([pass("a"), pass("b")]);
        assert!(check.evaluate(&state(), &LiveStateAccessor::new(&ctx)).is_ok());
    }

    #[test]
    fn test_compose_short_circuits() {
        let ctx = ProviderContext::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let b = Check::new("b", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CheckFailure::new("b", "should not run"))
        });

        let failure = compose([fail("a"), b])
            .evaluate(&state(), &LiveStateAccessor::new(&ctx))
            .unwrap_err();

        assert_eq!(failure.predicate, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compose_is_associative() {
        let nested = compose([compose([pass("a"), pass("b")]), pass("c")]);
        let flat = compose([pass("a"), pass("b"), pass("c")]);
        assert_eq!(nested.leaf_names(), flat.leaf_names());
        assert_eq!(flat.leaf_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_compose_passes() {
        let ctx = ProviderContext::default();
        let check = compose(Vec::new());
        assert!(check.leaf_names().is_empty());
        assert!(check.evaluate(&state(), &LiveStateAccessor::new(&ctx)).is_ok());
    }

    #[test]
    fn test_attr_equals() {
        let ctx = ProviderContext::default();
        let live = LiveStateAccessor::new(&ctx);

        assert!(
            attr_equals("aws_launch_configuration.bar", "image_id", "ami-fb8e9292")
                .evaluate(&state(), &live)
                .is_ok()
        );

        let failure = attr_equals("aws_launch_configuration.bar", "instance_type", "m1.small")
            .evaluate(&state(), &live)
            .unwrap_err();
        assert_eq!(failure.predicate, "attr(aws_launch_configuration.bar.instance_type)");
        assert!(failure.message.contains("m1.small"));
        assert!(failure.message.contains("t1.micro"));
    }

    #[test]
    fn test_attr_equals_missing_address() {
        let ctx = ProviderContext::default();
        let failure = attr_equals("aws_launch_configuration.baz", "image_id", "x")
            .evaluate(&state(), &LiveStateAccessor::new(&ctx))
            .unwrap_err();
        assert!(failure.message.contains("not found in state"));
    }

    #[test]
    fn test_exists_without_live_resource() {
        // Kind is not registered, so the live fetch reports an unknown code
        let ctx = ProviderContext::default();
        let failure = resource_exists("aws_launch_configuration.bar")
            .evaluate(&state(), &LiveStateAccessor::new(&ctx))
            .unwrap_err();
        assert!(failure.message.contains("aws_launch_configuration.Unknown"));
    }
}
