pub mod hid_report;
pub mod report_descriptor;
pub mod rumble;
#[cfg(test)]
pub mod rumble_test;
pub mod spi_flash;
