pub mod aid;
