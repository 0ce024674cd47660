#![forbid(unsafe_code)]

fn main() {
    std::process::exit(subsetter_cli::run());
}
