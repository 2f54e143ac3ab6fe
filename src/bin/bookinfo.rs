use clap::Parser;
use oebmodel::{read_book, ReaderConfig};

/// Reads an EPUB/OEB file and prints a summary of its book model.
#[derive(Parser, Debug)]
#[command(name = "bookinfo")]
struct Args {
    /// EPUB file to read
    file: String,

    /// Directory for cached paragraph blocks
    #[arg(long, default_value_os_t = std::env::temp_dir().join("oebmodel-cache"))]
    cache_dir: std::path::PathBuf,

    /// Print the contents (table of contents) tree
    #[arg(short, long)]
    toc: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = ReaderConfig::new(&args.cache_dir);
    let result = match read_book(args.file.as_ref(), &config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.file);
            std::process::exit(1);
        }
    };

    println!("Title:    {}", result.book.title);
    if let Some(language) = &result.book.language {
        println!("Language: {language}");
    }
    if !result.book.authors.is_empty() {
        let names: Vec<&str> = result.book.authors.iter().map(|a| a.display_name.as_str()).collect();
        println!("Authors:  {}", names.join(", "));
    }
    if let Some(cover) = &result.cover_image_name {
        println!("Cover:    {cover}");
    }
    println!("Paragraphs: {}", result.model.main_text_model.paragraph_count());
    println!("Contents nodes (top-level): {}", result.model.contents_root.len());

    if args.toc {
        for node in &result.model.contents_root {
            print_node(node, 0);
        }
    }
}

fn print_node(node: &oebmodel::book_model::ContentsNode, depth: usize) {
    println!("{}{}", "  ".repeat(depth), node.text);
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
