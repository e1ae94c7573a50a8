pub mod handle_scan;
