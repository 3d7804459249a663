pub use crate::error::Error;

pub use anstream::eprintln;
pub use anstream::println;
pub use color_eyre::eyre::{eyre, Context, Result};
pub use std::format as f;

use prettytable::format::{FormatBuilder, LinePosition, LineSeparator};

/// A borderless table whose titles are underlined.
pub fn new_table(titles: prettytable::Row) -> prettytable::Table {
    let mut table = prettytable::Table::new();

    let format = FormatBuilder::new()
        .padding(1, 1)
        .separators(&[LinePosition::Title], LineSeparator::new('-', ' ', ' ', ' '))
        .build();

    table.set_format(format);
    table.set_titles(titles);

    table
}
