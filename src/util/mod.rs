//! Utility modules

pub mod paths;

pub use paths::{
    config_path, data_dir, init_data_dir, list_trace_files, trace_file_name, traces_dir,
};
