pub mod crawl;
pub mod report;

const BANNER: &str = r#"
     _ _            _ _
 ___(_) |_ ___  __| (_) __ _
/ __| | __/ _ \/ _` | |/ _` |
\__ \ | ||  __/ (_| | | (_| |
|___/_|\__\___|\__,_|_|\__, |
                       |___/
"#;

pub fn print_banner() {
    eprintln!("{}", BANNER);
    eprintln!(
        "  sitedig v{} - same-origin site mapping crawler\n",
        env!("CARGO_PKG_VERSION")
    );
}
