fn main() {
    if let Err(error) = market_sync_lib::run() {
        eprintln!("market-sync: {error}");
        std::process::exit(1);
    }
}
