use metabridge::{cli, errors};

fn main() {
    if let Err(err) = cli::cli_main() {
        match err.into_fatal() {
            Ok(fatal) => errors::terminate(&fatal),
            Err(other) => {
                eprintln!("Error: {}", other);
                std::process::exit(1);
            }
        }
    }
}
