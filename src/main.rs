fn main() {
    if let Err(err) = territory_sync::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
