mod rtree;

#[ctor::ctor]
fn init() {
    colog::init();
}
