fn main() {
    thumbshelf_lib::run()
}
