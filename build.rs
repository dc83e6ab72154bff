fn main() {
    // ESP-IDF link args and cfg flags are only needed for firmware builds.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
