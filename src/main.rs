fn main() {
    if let Err(e) = delaycam_lib::run() {
        eprintln!("delaycam: {:#}", e);
        std::process::exit(1);
    }
}
