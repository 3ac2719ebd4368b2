fn main() -> anyhow::Result<()> {
    notedeck::cli::run()
}
