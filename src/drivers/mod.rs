pub mod spectrum_analyzer;
