//! AVM2 opcodes
//!
//! Defines the instruction set, the byte value of every opcode and the layout
//! of the operands that follow it in the code buffer.

/// Shape of the operands that follow an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    /// No operands
    None,
    /// One raw byte
    U8,
    /// One u30 (pool index, local index, slot or argument count)
    U30,
    /// Two u30s (index and argument count, or two locals)
    U30x2,
    /// One signed 24-bit branch offset
    S24,
    /// `default s24`, `case_count u30`, then `case_count + 1` s24 offsets
    LookupSwitch,
    /// `u8 kind`, `u30 name`, `u8 register`, `u30 extra`
    Debug,
}

macro_rules! define_opcodes {
    ($( $variant:ident = $byte:literal, $name:literal, $layout:ident, $doc:literal; )*) => {
        /// AVM2 opcodes, with their encoded byte values
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                #[doc = $doc]
                $variant = $byte,
            )*
        }

        impl Opcode {
            /// Decode an opcode byte
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $( $byte => Some(Opcode::$variant), )*
                    _ => None,
                }
            }

            /// Assembler mnemonic
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $name, )*
                }
            }

            /// Operand layout following the opcode byte
            pub fn operands(self) -> OperandLayout {
                match self {
                    $( Opcode::$variant => OperandLayout::$layout, )*
                }
            }
        }
    };
}

define_opcodes! {
    Bkpt = 0x01, "bkpt", None, "Debugger breakpoint (no effect)";
    Nop = 0x02, "nop", None, "No operation";
    Throw = 0x03, "throw", None, "Raise the top of stack";
    GetSuper = 0x04, "getsuper", U30, "Read a property through the base class";
    SetSuper = 0x05, "setsuper", U30, "Write a property through the base class";
    Dxns = 0x06, "dxns", U30, "Set the default XML namespace from a string constant";
    DxnsLate = 0x07, "dxnslate", None, "Set the default XML namespace from the stack";
    Kill = 0x08, "kill", U30, "Reset a local to undefined";
    Label = 0x09, "label", None, "Branch target marker (no effect)";
    IfNlt = 0x0C, "ifnlt", S24, "Branch unless a < b";
    IfNle = 0x0D, "ifnle", S24, "Branch unless a <= b";
    IfNgt = 0x0E, "ifngt", S24, "Branch unless a > b";
    IfNge = 0x0F, "ifnge", S24, "Branch unless a >= b";
    Jump = 0x10, "jump", S24, "Unconditional branch";
    IfTrue = 0x11, "iftrue", S24, "Branch if truthy";
    IfFalse = 0x12, "iffalse", S24, "Branch if falsy";
    IfEq = 0x13, "ifeq", S24, "Branch if a == b";
    IfNe = 0x14, "ifne", S24, "Branch if a != b";
    IfLt = 0x15, "iflt", S24, "Branch if a < b";
    IfLe = 0x16, "ifle", S24, "Branch if a <= b";
    IfGt = 0x17, "ifgt", S24, "Branch if a > b";
    IfGe = 0x18, "ifge", S24, "Branch if a >= b";
    IfStrictEq = 0x19, "ifstricteq", S24, "Branch if a === b";
    IfStrictNe = 0x1A, "ifstrictne", S24, "Branch if a !== b";
    LookupSwitch = 0x1B, "lookupswitch", LookupSwitch, "Jump table";
    PushWith = 0x1C, "pushwith", None, "Push a with-scope";
    PopScope = 0x1D, "popscope", None, "Pop the innermost scope";
    NextName = 0x1E, "nextname", None, "Name at an enumeration index";
    HasNext = 0x1F, "hasnext", None, "Next enumeration index";
    PushNull = 0x20, "pushnull", None, "Push null";
    PushUndefined = 0x21, "pushundefined", None, "Push undefined";
    NextValue = 0x23, "nextvalue", None, "Value at an enumeration index";
    PushByte = 0x24, "pushbyte", U8, "Push a sign-extended byte";
    PushShort = 0x25, "pushshort", U30, "Push a sign-extended 16-bit integer";
    PushTrue = 0x26, "pushtrue", None, "Push true";
    PushFalse = 0x27, "pushfalse", None, "Push false";
    PushNaN = 0x28, "pushnan", None, "Push NaN";
    Pop = 0x29, "pop", None, "Discard the top of stack";
    Dup = 0x2A, "dup", None, "Duplicate the top of stack";
    Swap = 0x2B, "swap", None, "Swap the two topmost values";
    PushString = 0x2C, "pushstring", U30, "Push a string constant";
    PushInt = 0x2D, "pushint", U30, "Push an int constant";
    PushUInt = 0x2E, "pushuint", U30, "Push a uint constant";
    PushDouble = 0x2F, "pushdouble", U30, "Push a double constant";
    PushScope = 0x30, "pushscope", None, "Push a scope";
    PushNamespace = 0x31, "pushnamespace", U30, "Push a namespace constant";
    HasNext2 = 0x32, "hasnext2", U30x2, "Advance an enumeration held in two locals";
    Li8 = 0x35, "li8", None, "Domain memory load (unsupported)";
    Li16 = 0x36, "li16", None, "Domain memory load (unsupported)";
    Li32 = 0x37, "li32", None, "Domain memory load (unsupported)";
    Lf32 = 0x38, "lf32", None, "Domain memory load (unsupported)";
    Lf64 = 0x39, "lf64", None, "Domain memory load (unsupported)";
    Si8 = 0x3A, "si8", None, "Domain memory store (unsupported)";
    Si16 = 0x3B, "si16", None, "Domain memory store (unsupported)";
    Si32 = 0x3C, "si32", None, "Domain memory store (unsupported)";
    Sf32 = 0x3D, "sf32", None, "Domain memory store (unsupported)";
    Sf64 = 0x3E, "sf64", None, "Domain memory store (unsupported)";
    NewFunction = 0x40, "newfunction", U30, "Create a closure";
    Call = 0x41, "call", U30, "Call a function value";
    Construct = 0x42, "construct", U30, "Construct from a class value";
    CallMethod = 0x43, "callmethod", U30x2, "Call by dispatch id (unsupported)";
    CallStatic = 0x44, "callstatic", U30x2, "Call a method by index";
    CallSuper = 0x45, "callsuper", U30x2, "Call a base class method";
    CallProperty = 0x46, "callproperty", U30x2, "Call a property";
    ReturnVoid = 0x47, "returnvoid", None, "Return undefined";
    ReturnValue = 0x48, "returnvalue", None, "Return the top of stack";
    ConstructSuper = 0x49, "constructsuper", U30, "Run the base class constructor";
    ConstructProp = 0x4A, "constructprop", U30x2, "Construct a property";
    CallSuperId = 0x4B, "callsuperid", None, "Reserved (unsupported)";
    CallPropLex = 0x4C, "callproplex", U30x2, "Call a property with a null receiver";
    CallInterface = 0x4D, "callinterface", U30x2, "Reserved (unsupported)";
    CallSuperVoid = 0x4E, "callsupervoid", U30x2, "Call a base class method, discarding the result";
    CallPropVoid = 0x4F, "callpropvoid", U30x2, "Call a property, discarding the result";
    Sxi1 = 0x50, "sxi1", None, "Sign extension (unsupported)";
    Sxi8 = 0x51, "sxi8", None, "Sign extension (unsupported)";
    Sxi16 = 0x52, "sxi16", None, "Sign extension (unsupported)";
    ApplyType = 0x53, "applytype", U30, "Instantiate a parameterized type";
    NewObject = 0x55, "newobject", U30, "Create an object from key/value pairs";
    NewArray = 0x56, "newarray", U30, "Create an array";
    NewActivation = 0x57, "newactivation", None, "Create the activation object";
    NewClass = 0x58, "newclass", U30, "Create a class";
    GetDescendants = 0x59, "getdescendants", U30, "XML descendants (unsupported)";
    NewCatch = 0x5A, "newcatch", U30, "Create a catch scope object";
    FindPropStrict = 0x5D, "findpropstrict", U30, "Find the scope object holding a name, or fail";
    FindProperty = 0x5E, "findproperty", U30, "Find the scope object holding a name";
    FindDef = 0x5F, "finddef", U30, "Find a script definition (unsupported)";
    GetLex = 0x60, "getlex", U30, "Find and read a name";
    SetProperty = 0x61, "setproperty", U30, "Write a property";
    GetLocal = 0x62, "getlocal", U30, "Push a local";
    SetLocal = 0x63, "setlocal", U30, "Store a local";
    GetGlobalScope = 0x64, "getglobalscope", None, "Push the global object";
    GetScopeObject = 0x65, "getscopeobject", U8, "Push a scope stack entry";
    GetProperty = 0x66, "getproperty", U30, "Read a property";
    GetOuterScope = 0x67, "getouterscope", U30, "Outer scope access (unsupported)";
    InitProperty = 0x68, "initproperty", U30, "Initialize a property";
    DeleteProperty = 0x6A, "deleteproperty", U30, "Delete a property";
    GetSlot = 0x6C, "getslot", U30, "Read a slot";
    SetSlot = 0x6D, "setslot", U30, "Write a slot";
    GetGlobalSlot = 0x6E, "getglobalslot", U30, "Read a global slot";
    SetGlobalSlot = 0x6F, "setglobalslot", U30, "Write a global slot";
    ConvertS = 0x70, "convert_s", None, "Convert to string";
    EscXElem = 0x71, "esc_xelem", None, "XML escape (unsupported)";
    EscXAttr = 0x72, "esc_xattr", None, "XML escape (unsupported)";
    ConvertI = 0x73, "convert_i", None, "Convert to int";
    ConvertU = 0x74, "convert_u", None, "Convert to uint";
    ConvertD = 0x75, "convert_d", None, "Convert to Number";
    ConvertB = 0x76, "convert_b", None, "Convert to Boolean";
    ConvertO = 0x77, "convert_o", None, "Check for a non-null object";
    CheckFilter = 0x78, "checkfilter", None, "XML filter check (unsupported)";
    Coerce = 0x80, "coerce", U30, "Coerce to a named type";
    CoerceB = 0x81, "coerce_b", None, "Coerce to Boolean";
    CoerceA = 0x82, "coerce_a", None, "Coerce to any (no effect)";
    CoerceI = 0x83, "coerce_i", None, "Coerce to int";
    CoerceD = 0x84, "coerce_d", None, "Coerce to Number";
    CoerceS = 0x85, "coerce_s", None, "Coerce to String, keeping null";
    AsType = 0x86, "astype", U30, "Value if it is of a named type, else null";
    AsTypeLate = 0x87, "astypelate", None, "Value if it is of a type from the stack, else null";
    CoerceU = 0x88, "coerce_u", None, "Coerce to uint";
    CoerceO = 0x89, "coerce_o", None, "Coerce to Object";
    Negate = 0x90, "negate", None, "Numeric negation";
    Increment = 0x91, "increment", None, "Add one";
    IncLocal = 0x92, "inclocal", U30, "Add one to a local";
    Decrement = 0x93, "decrement", None, "Subtract one";
    DecLocal = 0x94, "declocal", U30, "Subtract one from a local";
    TypeOf = 0x95, "typeof", None, "typeof operator";
    Not = 0x96, "not", None, "Boolean negation";
    BitNot = 0x97, "bitnot", None, "Bitwise complement";
    Add = 0xA0, "add", None, "Addition or concatenation";
    Subtract = 0xA1, "subtract", None, "Subtraction";
    Multiply = 0xA2, "multiply", None, "Multiplication";
    Divide = 0xA3, "divide", None, "Division";
    Modulo = 0xA4, "modulo", None, "Remainder";
    LShift = 0xA5, "lshift", None, "Left shift";
    RShift = 0xA6, "rshift", None, "Signed right shift";
    URShift = 0xA7, "urshift", None, "Unsigned right shift";
    BitAnd = 0xA8, "bitand", None, "Bitwise and";
    BitOr = 0xA9, "bitor", None, "Bitwise or";
    BitXor = 0xAA, "bitxor", None, "Bitwise xor";
    Equals = 0xAB, "equals", None, "Abstract equality";
    StrictEquals = 0xAC, "strictequals", None, "Strict equality";
    LessThan = 0xAD, "lessthan", None, "a < b";
    LessEquals = 0xAE, "lessequals", None, "a <= b";
    GreaterThan = 0xAF, "greaterthan", None, "a > b";
    GreaterEquals = 0xB0, "greaterequals", None, "a >= b";
    InstanceOf = 0xB1, "instanceof", None, "Prototype chain test";
    IsType = 0xB2, "istype", U30, "Test against a named type";
    IsTypeLate = 0xB3, "istypelate", None, "Test against a type from the stack";
    In = 0xB4, "in", None, "Property existence test";
    IncrementI = 0xC0, "increment_i", None, "Add one (int)";
    DecrementI = 0xC1, "decrement_i", None, "Subtract one (int)";
    IncLocalI = 0xC2, "inclocal_i", U30, "Add one to a local (int)";
    DecLocalI = 0xC3, "declocal_i", U30, "Subtract one from a local (int)";
    NegateI = 0xC4, "negate_i", None, "Negation (int)";
    AddI = 0xC5, "add_i", None, "Addition (int)";
    SubtractI = 0xC6, "subtract_i", None, "Subtraction (int)";
    MultiplyI = 0xC7, "multiply_i", None, "Multiplication (int)";
    GetLocal0 = 0xD0, "getlocal0", None, "Push local 0";
    GetLocal1 = 0xD1, "getlocal1", None, "Push local 1";
    GetLocal2 = 0xD2, "getlocal2", None, "Push local 2";
    GetLocal3 = 0xD3, "getlocal3", None, "Push local 3";
    SetLocal0 = 0xD4, "setlocal0", None, "Store local 0";
    SetLocal1 = 0xD5, "setlocal1", None, "Store local 1";
    SetLocal2 = 0xD6, "setlocal2", None, "Store local 2";
    SetLocal3 = 0xD7, "setlocal3", None, "Store local 3";
    Debug = 0xEF, "debug", Debug, "Debug register info (no effect)";
    DebugLine = 0xF0, "debugline", U30, "Source line marker (no effect)";
    DebugFile = 0xF1, "debugfile", U30, "Source file marker (no effect)";
    BkptLine = 0xF2, "bkptline", U30, "Line breakpoint (no effect)";
    Timestamp = 0xF3, "timestamp", None, "Timestamp marker (no effect)";
}

impl Opcode {
    /// Whether the engine executes this opcode.
    ///
    /// XML, domain memory, sign extension and the reserved call forms are
    /// recognized but rejected: the interpreter raises a verify error and the
    /// compiler refuses the method.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            Opcode::Li8
                | Opcode::Li16
                | Opcode::Li32
                | Opcode::Lf32
                | Opcode::Lf64
                | Opcode::Si8
                | Opcode::Si16
                | Opcode::Si32
                | Opcode::Sf32
                | Opcode::Sf64
                | Opcode::Sxi1
                | Opcode::Sxi8
                | Opcode::Sxi16
                | Opcode::CallMethod
                | Opcode::CallSuperId
                | Opcode::CallInterface
                | Opcode::GetDescendants
                | Opcode::FindDef
                | Opcode::GetOuterScope
                | Opcode::EscXElem
                | Opcode::EscXAttr
                | Opcode::CheckFilter
        )
    }

    /// Conditional branches that pop two operands.
    pub fn is_compare_branch(self) -> bool {
        matches!(
            self,
            Opcode::IfNlt
                | Opcode::IfNle
                | Opcode::IfNgt
                | Opcode::IfNge
                | Opcode::IfEq
                | Opcode::IfNe
                | Opcode::IfLt
                | Opcode::IfLe
                | Opcode::IfGt
                | Opcode::IfGe
                | Opcode::IfStrictEq
                | Opcode::IfStrictNe
        )
    }

    /// Instructions after which control never falls through.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::LookupSwitch
                | Opcode::Throw
                | Opcode::ReturnVoid
                | Opcode::ReturnValue
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
