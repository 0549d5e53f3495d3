fn main() {
    wildfire_pipeline::cli::run();
}
