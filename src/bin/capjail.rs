fn main() {
    if let Err(err) = capjail::cli::run() {
        eprintln!("capjail: {:#}", err);
        std::process::exit(capjail::cli::exit_code(&err));
    }
}
