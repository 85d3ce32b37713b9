#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Attribute macros running a function inside a freshly built jobsys
//! `JobSystem`.

mod entry;
mod parse;

/// Runs the marked function with a job system installed on the main thread.
///
/// The system is built before the body runs and shut down when it returns, so
/// the free functions `jobsys::dispatch`, `jobsys::wait`, ... target it
/// without calling `jobsys::initialize`.
///
/// # Flavors
///
/// ## Work stealing (default)
///
/// ```no_run
/// #[jobsys::main(flavor = "stealing", worker_threads = 4)]
/// fn main() {}
/// ```
///
/// `worker_threads` defaults to the number of logical cores.
///
/// ## Inline
///
/// Every group runs on the dispatching thread, before `dispatch` returns.
///
/// ```no_run
/// #[jobsys::main(flavor = "inline")]
/// fn main() {}
/// ```
///
/// # Function arguments
///
/// `main` cannot take arguments and the function cannot be `async`.
///
/// # Usage
///
/// ```no_run
/// #[jobsys::main(worker_threads = 2)]
/// fn main() {
///     let ctx = jobsys::Context::new();
///     jobsys::dispatch(&ctx, 100, 10, 0, |args| println!("{}", args.job_index));
///     jobsys::wait(&ctx);
/// }
/// ```
///
/// Equivalent code not using `#[jobsys::main]`
///
/// ```no_run
/// fn main() {
///     jobsys::runtime::Builder::new_stealing()
///         .worker_threads(2)
///         .try_build()
///         .unwrap()
///         .install(|| {
///             let ctx = jobsys::Context::new();
///             jobsys::dispatch(&ctx, 100, 10, 0, |args| println!("{}", args.job_index));
///             jobsys::wait(&ctx);
///         })
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Marks a test that runs with its own job system installed on the test
/// thread. Every test gets a separate system, shut down when the test returns.
///
/// The default flavor is `inline`, unless `worker_threads` is given.
///
/// ```no_run
/// #[jobsys::test(worker_threads = 2)]
/// fn my_test() {
///     assert_eq!(jobsys::dispatch_group_count(10, 3), 4);
/// }
/// ```
///
/// Equivalent code not using `#[jobsys::test]`
///
/// ```no_run
/// #[test]
/// fn my_test() {
///     jobsys::runtime::Builder::new_stealing()
///         .worker_threads(2)
///         .try_build()
///         .unwrap()
///         .install(|| {
///             assert_eq!(jobsys::dispatch_group_count(10, 3), 4);
///         })
/// }
/// ```
///
/// Test functions may return a `Result`:
///
/// ```no_run
/// #[jobsys::test(flavor = "inline")]
/// fn my_test() -> anyhow::Result<()> {
///     let ctx = jobsys::Context::new();
///     jobsys::execute(&ctx, |_| {});
///     jobsys::wait(&ctx);
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
