pub mod gadget;
