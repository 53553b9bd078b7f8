//! List commands implementation

use boardio_core::board::BoardDatabase;

/// List all known board tables
pub fn list_boards(db: &BoardDatabase) {
    println!("Known boards:");
    println!();
    println!("{:<16} {:<40} {:>5} {:>4}", "Name", "Board", "Pins", "I2C");
    println!("{}", "-".repeat(68));

    for board in db.iter() {
        println!(
            "{:<16} {:<40} {:>5} {:>4}",
            board.name,
            board.display_name(),
            board.pin_count(),
            board.i2c.len()
        );
    }
}
