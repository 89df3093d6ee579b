mod backend;
mod cli;
mod encoder;
mod static_embeddings;
mod word2vec;

fn main() -> anyhow::Result<()> {
    cli::run()
}
