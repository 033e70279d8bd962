#![allow(non_snake_case)]
use RustedKrylov::Examples::krylov_examples::krylov_examples;
use RustedKrylov::Utils::logger::init_logger;

fn main() {
    let example = 1;
    if let Err(e) = init_logger(Some("info"), false) {
        eprintln!("{}", e);
    }
    match krylov_examples(example) {
        Ok(report) => println!(
            "example {} finished: {} (code {})",
            example,
            report.status,
            report.code()
        ),
        Err(e) => eprintln!("example {} failed: {} (code {})", example, e, e.code()),
    }
}
