fn main() {
    if let Err(err) = shoreline::run() {
        eprintln!("Application error: {err}");
    }
}
