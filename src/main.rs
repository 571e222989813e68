fn main() {
    if let Err(e) = feedesk_lib::run() {
        eprintln!("feedesk: {e:#}");
        std::process::exit(1);
    }
}
