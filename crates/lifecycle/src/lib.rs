//! # Lifecycle
//!
//! A harness for resource lifecycle acceptance tests.
//!
//! A test case applies one or more configurations against a provider,
//! checks the recorded and live state after each step, tears everything
//! down, and then confirms every created resource is really gone.
//!
//! ## Core Concepts
//!
//! - **ResourceKind**: A provider-backed resource type that can be applied, queried and destroyed
//! - **LiveStateAccessor**: Fetches the current remote view of a resource by ID
//! - **ErrorClassifier**: Maps provider error codes to not-found, transient or fatal
//! - **Check**: A predicate over recorded state, composable with [`compose`]
//! - **DestroyVerifier**: Confirms recorded resources no longer exist after teardown
//! - **Harness**: Drives a [`TestCase`] through precheck, steps, teardown and verification
//!
//! ## Example
//!
//! ```ignore
//! use lifecycle::{
//!     attr_equals, resource_exists, ClassifierTable, Classifiers, Configuration, Harness,
//!     KindRegistry, ProviderContext, ResourceDecl, RetryConfig, SandboxKind, TestCase, TestStep,
//! };
//! use std::sync::Arc;
//!
//! let registry = KindRegistry::new().with(
//!     SandboxKind::new("aws_launch_configuration")
//!         .id_attribute("name")
//!         .not_found_code("InvalidLaunchConfiguration.NotFound"),
//! )?;
//! let classifiers = Classifiers::new().with("aws", &ClassifierTable::aws())?;
//! let ctx = ProviderContext::new(registry, classifiers, RetryConfig::default());
//!
//! let address = "aws_launch_configuration.bar";
//! let case = TestCase::builder("launch_configuration")
//!     .step(
//!         TestStep::new(Configuration::new().resource(
//!             ResourceDecl::new("aws_launch_configuration", "bar")
//!                 .attr("name", "foobar-terraform-test")
//!                 .attr("image_id", "ami-fb8e9292"),
//!         ))
//!         .check(resource_exists(address))
//!         .check(attr_equals(address, "image_id", "ami-fb8e9292")),
//!     )
//!     .build();
//!
//! let report = Harness::new(Arc::new(ctx)).run(&case);
//! assert!(report.is_success());
//! ```

pub mod accessor;
pub mod apply;
pub mod check;
pub mod classify;
pub mod destroy;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod sandbox;
pub mod types;

// Re-exports for convenience
pub use accessor::LiveStateAccessor;
pub use apply::{Applier, RegistryApplier};
pub use check::{Check, attr_equals, compose, live_attr_equals, resource_exists};
pub use classify::{ClassifierTable, Classifiers, ErrorClassifier};
pub use destroy::DestroyVerifier;
pub use error::{
    ApplyError, CheckFailure, DestroyError, DestroyFailure, Error, ErrorClass, FetchError,
    ProviderError, QueryError, Result,
};
pub use orchestrator::{
    CancelFlag, Harness, LifecycleObserver, NoObserver, Outcome, Phase, RunReport, TestCase,
    TestStep,
};
pub use provider::{KindRegistry, ProviderContext, ResourceKind, SharedKind};
pub use retry::{LogCallback, NoCallback, RetryCallback, with_retry};
pub use sandbox::{Faults, SandboxKind};
pub use types::{
    Attributes, Configuration, LiveResource, RecordedState, ResourceDecl, ResourceRecord,
    RetryConfig,
};
