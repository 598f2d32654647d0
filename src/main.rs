fn main() {
    if let Err(err) = typst_plot_backend::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
