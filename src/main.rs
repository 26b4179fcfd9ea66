fn main() {
    if let Err(err) = csv_stack::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
