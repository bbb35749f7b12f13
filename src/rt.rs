use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

// The rotation flow itself is sequential and synchronous; the AWS and GitHub
// clients are async. One shared runtime drives them.
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("keyturn-rt")
        .build()
        .expect("build keyturn runtime")
});

/// Run a future to completion from synchronous code.
pub fn sync_await<F>(fut: F) -> F::Output
where
    F: std::future::Future,
{
    RUNTIME.block_on(fut)
}
