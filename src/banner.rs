// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    // Using a raw string literal for the multi-line banner
    let banner = r#"
       _               _                             _
  ___ | |__   ___  ___| |_      __ _ _ __ __ _  __| | ___ _ __
 / __|| '_ \ / _ \/ _ \ __|___ / _` | '__/ _` |/ _` |/ _ \ '__|
 \__ \| | | |  __/  __/ ||___| (_| | | | (_| | (_| |  __/ |
 |___/|_| |_|\___|\___|\__|   \__, |_|  \__,_|\__,_|\___|_|
                              |___/

    Spreadsheet Assessment Grading Service
"#;
    println!("{}", banner);
}
