fn main() -> std::process::ExitCode {
    spotify_profile_lib::run()
}
