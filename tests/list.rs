use mini_rx_dom::*;
use test_log::test;
use std::rc::Rc;

#[derive(Debug, Clone)]
struct Todo {
    text: String
}

fn template(build: impl FnOnce(TemplateBuilder) -> TemplateBuilder) -> Rc<Template> {
    Rc::new(build(TemplateBuilder::new()).build().unwrap())
}

fn setup() -> (RxRuntime, MemTree, Renderer<MemTree>, MemNode) {
    let rt = RxRuntime::new();
    let host = MemTree::new();
    let renderer = Renderer::new(&rt, host.clone());
    let root = host.create_element("div", &Namespace::Html);
    (rt, host, renderer, root)
}

fn render_list(renderer: &Renderer<MemTree>, root: &MemNode, list: Arg<MemTree>) -> MemNode {
    let ul = template(|b| b.open("ul").hole().close("ul"));
    renderer.render(&Markup::new(&ul, vec![list]).unwrap(), root);
    root.child_elements()[0].clone()
}

fn letters(items: &RxVec<&'static str>) -> Arg<MemTree> {
    let li = template(|b| b.open("li").hole().close("li"));
    Arg::from(each(items, move |view: &View<&'static str>| -> Markup<MemTree> {
        let view = view.clone();
        Markup::new(&li, vec![Arg::computed(move || view.item())]).unwrap()
    }))
}

#[test]
fn appending_keeps_existing_nodes() {
    let (rt, host, renderer, root) = setup();
    let items = rt.watch_vec(vec!["a", "b", "c"]);
    let ul = render_list(&renderer, &root, letters(&items));
    assert_eq!(host.inner_html(&root), "<ul><li>a</li><li>b</li><li>c</li></ul>");
    let before = ul.child_elements();
    let (elements, removed) = (host.elements_created(), host.removed());

    items.push("d");
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>a</li><li>b</li><li>c</li><li>d</li></ul>");
    let after = ul.child_elements();
    assert_eq!(&after[..3], &before[..]);
    assert_eq!(host.elements_created(), elements + 1);
    assert_eq!(host.removed(), removed);
}

#[test]
fn reordering_rebinds_views_in_place() {
    let (rt, host, renderer, root) = setup();
    let items = rt.watch_vec(vec!["a", "b", "c"]);
    let ul = render_list(&renderer, &root, letters(&items));
    let before = ul.child_elements();
    let counts = (host.elements_created(), host.texts_created(), host.removed());

    items.splice(.., ["c", "a", "b"]);
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>c</li><li>a</li><li>b</li></ul>");
    assert_eq!(ul.child_elements(), before);
    assert_eq!((host.elements_created(), host.texts_created(), host.removed()), counts);
}

#[test]
fn shrinking_removes_only_the_trailing_items() {
    let (rt, host, renderer, root) = setup();
    let items = rt.watch_vec(vec!["a", "b", "c", "d", "e"]);
    let ul = render_list(&renderer, &root, letters(&items));
    let before = ul.child_elements();
    let removed = host.removed();

    for _ in 0..3 {
        items.pop();
    }
    rt.recompute();
    assert_eq!(host.removed(), removed + 3);
    assert_eq!(ul.child_elements(), before[..2].to_vec());
    assert!(before[2..].iter().all(MemNode::is_removed));
    assert_eq!(
        host.inner_html_with_markers(&root),
        "<ul><!----><li><!---->a<!----></li><li><!---->b<!----></li><!----></ul>"
    );

    items.clear();
    rt.recompute();
    assert_eq!(host.inner_html_with_markers(&root), "<ul><!----><!----></ul>");
}

#[test]
fn editing_an_item_only_touches_its_text() {
    let (rt, host, renderer, root) = setup();
    let todos = rt.watch_vec(vec![
        rt.watch(Todo { text: "x".to_string() }),
        rt.watch(Todo { text: "y".to_string() })
    ]);
    let li = template(|b| b.open("li").hole().close("li"));
    let list: Each<Observable<Todo>, MemTree> = each(&todos, move |view: &View<Observable<Todo>>| -> Markup<MemTree> {
        let view = view.clone();
        Markup::new(&li, vec![Arg::computed(move || view.item().with("text", |todo| todo.text.clone()))]).unwrap()
    });
    let ul = render_list(&renderer, &root, list.into());
    assert_eq!(host.inner_html(&root), "<ul><li>x</li><li>y</li></ul>");
    let text = ul.child_elements()[1].children()[1].clone();
    assert_eq!(text.text_content(), "y");
    let counts = (host.elements_created(), host.texts_created(), host.removed());

    todos.get(1).unwrap().update("text", |todo| todo.text = "z".to_string());
    assert_eq!(rt.pending(), 1);
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>x</li><li>z</li></ul>");
    assert_eq!(ul.child_elements()[1].children()[1], text);
    assert_eq!(text.text_content(), "z");
    assert_eq!((host.elements_created(), host.texts_created(), host.removed()), counts);

    // Its nodes are gone, so its bindings no longer write
    let popped = todos.pop().unwrap();
    rt.recompute();
    assert!(text.is_removed());
    popped.update("text", |todo| todo.text = "w".to_string());
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>x</li></ul>");
    assert_eq!(text.text_content(), "z");
    assert!(!rt.is_scheduled());
}

#[test]
fn filtered_items_do_not_take_a_position() {
    let (rt, host, renderer, root) = setup();
    let numbers = rt.watch_vec(vec![1, 2, 3, 4]);
    let li = template(|b| b.open("li").hole().close("li"));
    let list: Each<i32, MemTree> = each(&numbers, move |view: &View<i32>| -> Markup<MemTree> {
        let view = view.clone();
        Markup::new(&li, vec![Arg::computed(move || format!("{}@{}", view.item(), view.index()))]).unwrap()
    }).filter(|number, _| number % 2 == 0);
    render_list(&renderer, &root, list.into());
    assert_eq!(host.inner_html(&root), "<ul><li>2@1</li><li>4@3</li></ul>");
    let elements = host.elements_created();

    numbers.set(0, 6);
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>6@0</li><li>2@1</li><li>4@3</li></ul>");
    assert_eq!(host.elements_created(), elements + 1);
}

#[test]
fn empty_items_are_anchored_by_a_marker() {
    let (rt, host, renderer, root) = setup();
    let numbers = rt.watch_vec(vec![1, 2, 3]);
    let list: Each<i32, MemTree> = each(&numbers, |view: &View<i32>| -> Content<MemTree> {
        let number = view.with_item(|number| *number);
        if number % 2 == 0 {
            number.to_string().into()
        } else {
            Content::Empty
        }
    });
    render_list(&renderer, &root, list.into());
    assert_eq!(host.inner_html_with_markers(&root), "<ul><!----><!---->2<!----><!----></ul>");

    numbers.pop();
    rt.recompute();
    assert_eq!(host.inner_html_with_markers(&root), "<ul><!----><!---->2<!----></ul>");
}

#[test]
fn re_rendering_replaces_the_list_binding() {
    let (rt, host, renderer, root) = setup();
    let old = rt.watch_vec(vec!["a"]);
    let new = rt.watch_vec(vec!["x", "y"]);
    render_list(&renderer, &root, letters(&old));
    render_list(&renderer, &root, letters(&new));
    assert_eq!(host.inner_html(&root), "<ul><li>x</li><li>y</li></ul>");

    old.push("b");
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>x</li><li>y</li></ul>");

    new.push("z");
    rt.recompute();
    assert_eq!(host.inner_html(&root), "<ul><li>x</li><li>y</li><li>z</li></ul>");
}
