fn main() {
    if let Err(err) = portico::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
