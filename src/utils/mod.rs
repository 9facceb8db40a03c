pub mod java_detector;
