// Built-in UI challenges and their assertion suites

use super::UiChallenge;
use crate::error::ExecutionError;
use crate::ui::dom::{Dom, Element};
use crate::ui::session::RenderSession;
use crate::ui::{Assertion, Outcome};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TRANSITION: Regex =
        Regex::new(r"\b(transition|animation|animate|@keyframes)").expect("static regex");
    static ref INCREMENT: Regex =
        Regex::new(r"(?i)^\s*(\+\s*1?|＋)\s*$|increment|increase|\badd\b|\bplus\b|\bup\b").expect("static regex");
    static ref DECREMENT: Regex =
        Regex::new(r"(?i)^\s*([-−–]\s*1?)\s*$|decrement|decrease|minus|subtract|\bdown\b").expect("static regex");
    static ref RESET: Regex = Regex::new(r"(?i)reset|clear|zero").expect("static regex");
    static ref ADD_ITEM: Regex = Regex::new(r"(?i)\badd\b|create|submit|save|^\s*\+\s*$").expect("static regex");
    static ref REMOVE_ITEM: Regex =
        Regex::new(r"(?i)delete|remove|trash|^\s*[x×✕✖🗑]\s*$").expect("static regex");
}

pub fn builtin() -> Vec<UiChallenge> {
    vec![toggle_switch(), counter(), todo_list()]
}

fn toggle_switch() -> UiChallenge {
    UiChallenge {
        id: "toggle-switch".to_string(),
        title: "Toggle Switch".to_string(),
        description: "A control that flips between on and off when clicked and looks different in each state."
            .to_string(),
        entry_point: "Component".to_string(),
        assertions: vec![
            Assertion::structural("uses a state hook", toggle_has_state),
            Assertion::structural("click changes state", toggle_click_changes_state),
            Assertion::structural("conditional styling", toggle_conditional_styling),
            Assertion::heuristic("transition or animation", has_transition),
        ],
    }
}

fn counter() -> UiChallenge {
    UiChallenge {
        id: "counter".to_string(),
        title: "Counter".to_string(),
        description: "A counter starting at 0 with increment, decrement (never below 0) and reset.".to_string(),
        entry_point: "Component".to_string(),
        assertions: vec![
            Assertion::structural("displays the count", counter_displays_zero),
            Assertion::structural("increment", counter_increments),
            Assertion::structural("prevents negative", counter_prevents_negative),
            Assertion::structural("reset", counter_resets),
        ],
    }
}

fn todo_list() -> UiChallenge {
    UiChallenge {
        id: "todo-list".to_string(),
        title: "Todo List".to_string(),
        description: "A text field and add button that append items, each with a way to remove it.".to_string(),
        entry_point: "Component".to_string(),
        assertions: vec![
            Assertion::structural("renders an input and an add button", todo_has_controls),
            Assertion::structural("adds an item", todo_adds_item),
            Assertion::structural("removes an item", todo_removes_item),
            Assertion::structural("ignores empty input", todo_ignores_empty),
        ],
    }
}

// ---- toggle switch ----

fn toggle_has_state(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let states = session.state()?;
    let uses_state = states.iter().flat_map(|c| &c.hooks).any(|h| h.is_state());
    Ok(Outcome::check(
        uses_state,
        "component keeps its on/off value in state",
        "no useState, useReducer or class state found; the toggle needs state to remember whether it is on",
    ))
}

fn toggle_click_changes_state(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let target = match session.dom().primary_clickable() {
        Some(element) => element.id,
        None => return Ok(Outcome::fail("nothing clickable was rendered")),
    };
    let before = session.state_values()?;
    session.click(target)?;
    let after = session.state_values()?;
    Ok(Outcome::check(
        before != after,
        "clicking the toggle updates its state",
        "clicking the toggle did not change any state",
    ))
}

fn toggle_conditional_styling(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let target = match session.dom().primary_clickable() {
        Some(element) => element.id,
        None => return Ok(Outcome::fail("nothing clickable was rendered")),
    };
    let before = session.dom().appearance();
    let after = session.click(target)?.appearance();
    Ok(Outcome::check(
        before != after,
        "class names or inline styles differ between on and off",
        "the rendered class names and styles are identical before and after a click; use a conditional className or style",
    ))
}

fn has_transition(source: &str) -> Outcome {
    Outcome::check(
        TRANSITION.is_match(source),
        "a transition or animation is defined",
        "no transition or animation found; add a CSS transition so the switch animates",
    )
}

// ---- counter ----

fn displayed(dom: &Dom) -> Vec<f64> {
    dom.numbers()
}

fn counter_displays_zero(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let numbers = displayed(session.dom());
    Ok(Outcome::check(
        numbers.contains(&0.0),
        "the count starts at 0",
        format!("expected the count 0 to be displayed, found {}", describe_numbers(&numbers)),
    ))
}

fn counter_increments(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let increment = match button(session.dom(), &INCREMENT) {
        Some(id) => id,
        None => return Ok(Outcome::fail("no increment button found (label it \"+\" or \"Increment\")")),
    };
    let numbers = displayed(session.click(increment)?);
    Ok(Outcome::check(
        numbers.contains(&1.0),
        "clicking increment shows 1",
        format!("expected 1 after one increment, found {}", describe_numbers(&numbers)),
    ))
}

fn counter_prevents_negative(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let decrement = match button(session.dom(), &DECREMENT) {
        Some(id) => id,
        None => return Ok(Outcome::fail("no decrement button found (label it \"-\" or \"Decrement\")")),
    };
    // a disabled decrement at zero is a valid floor; the click is ignored
    let numbers = displayed(session.click(decrement)?);
    let negative = numbers.iter().any(|n| *n < 0.0);
    Ok(Outcome::check(
        !negative && numbers.contains(&0.0),
        "decrement at 0 keeps the count at 0",
        format!(
            "clicking decrement at 0 showed {}; the count must not go below 0",
            describe_numbers(&numbers)
        ),
    ))
}

fn counter_resets(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let increment = match button(session.dom(), &INCREMENT) {
        Some(id) => id,
        None => return Ok(Outcome::fail("no increment button found, so reset cannot be checked")),
    };
    let reset = match button(session.dom(), &RESET) {
        Some(id) => id,
        None => return Ok(Outcome::fail("no reset button found (label it \"Reset\")")),
    };
    session.click(increment)?;
    session.click(increment)?;
    let numbers = displayed(session.click(reset)?);
    Ok(Outcome::check(
        numbers.contains(&0.0) && !numbers.contains(&2.0),
        "reset returns the count to 0",
        format!("expected 0 after reset, found {}", describe_numbers(&numbers)),
    ))
}

fn describe_numbers(numbers: &[f64]) -> String {
    if numbers.is_empty() {
        return "no numbers".to_string();
    }
    let shown: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
    shown.join(", ")
}

fn button(dom: &Dom, label: &Regex) -> Option<u64> {
    dom.button_matching(label).map(|b| b.id)
}

// ---- todo list ----

struct TodoControls {
    input: u64,
    add: Option<u64>,
}

fn todo_controls(dom: &Dom) -> Option<TodoControls> {
    let input = dom.find(Element::is_text_input)?.id;
    let add = dom
        .buttons()
        .into_iter()
        .find(|b| ADD_ITEM.is_match(&b.label()))
        .map(|b| b.id);
    Some(TodoControls { input, add })
}

/// Enter `text` and add it with the button, or by submitting when there is none
fn add_todo(session: &mut RenderSession<'_>, controls: &TodoControls, text: &str) -> Result<(), ExecutionError> {
    session.change(controls.input, text)?;
    match controls.add {
        Some(add) => session.click(add)?,
        None => session.key_down(controls.input, "Enter")?,
    };
    Ok(())
}

fn item_count(dom: &Dom) -> usize {
    let items = dom.by_tag("li").len();
    if items > 0 {
        items
    } else {
        dom.buttons().iter().filter(|b| REMOVE_ITEM.is_match(&b.label())).count()
    }
}

fn todo_has_controls(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let dom = session.dom();
    let outcome = match todo_controls(dom) {
        None => Outcome::fail("no text input found for new items"),
        Some(TodoControls { add: None, .. }) if dom.by_tag("form").is_empty() => {
            Outcome::fail("no add button found (label it \"Add\")")
        }
        Some(_) => Outcome::pass("a text input and a way to add items are rendered"),
    };
    Ok(outcome)
}

fn todo_adds_item(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let controls = match todo_controls(session.dom()) {
        Some(controls) => controls,
        None => return Ok(Outcome::fail("no text input found for new items")),
    };
    add_todo(session, &controls, "Buy milk")?;
    Ok(Outcome::check(
        session.dom().visible_text().contains("Buy milk"),
        "a new item appears in the list",
        "typed \"Buy milk\" and added it, but it does not appear in the list",
    ))
}

fn todo_removes_item(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let controls = match todo_controls(session.dom()) {
        Some(controls) => controls,
        None => return Ok(Outcome::fail("no text input found for new items")),
    };
    add_todo(session, &controls, "Walk the dog")?;
    if !session.dom().visible_text().contains("Walk the dog") {
        return Ok(Outcome::fail("could not add an item to remove"));
    }
    let remove = session
        .dom()
        .buttons()
        .into_iter()
        .find(|b| REMOVE_ITEM.is_match(&b.label()))
        .map(|b| b.id);
    let remove = match remove {
        Some(id) => id,
        None => return Ok(Outcome::fail("no remove button found next to the item (label it \"Delete\")")),
    };
    let gone = !session.click(remove)?.visible_text().contains("Walk the dog");
    Ok(Outcome::check(
        gone,
        "removing an item takes it out of the list",
        "clicked remove but \"Walk the dog\" is still listed",
    ))
}

fn todo_ignores_empty(session: &mut RenderSession<'_>) -> Result<Outcome, ExecutionError> {
    let controls = match todo_controls(session.dom()) {
        Some(controls) => controls,
        None => return Ok(Outcome::fail("no text input found for new items")),
    };
    let before = item_count(session.dom());
    add_todo(session, &controls, "   ")?;
    let after = item_count(session.dom());
    Ok(Outcome::check(
        after == before,
        "blank input does not add an item",
        format!("adding blank text changed the list from {} to {} items", before, after),
    ))
}
