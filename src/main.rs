fn main() -> std::process::ExitCode {
    composer_hub_lib::run()
}
