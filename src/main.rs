fn main() {
    tezpulse_lib::run()
}
