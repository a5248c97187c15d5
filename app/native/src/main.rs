//! Winsync - replay notification scripts through a live reconciler session
//! and manage its configuration.

fn main() {
    if let Err(err) = winsync_lib::cli::run() {
        eprintln!("winsync: {err}");
        std::process::exit(1);
    }
}
