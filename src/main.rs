fn main() {
    casegen_lib::run()
}
